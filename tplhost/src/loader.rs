//! Asynchronous loading and instantiation of the compiler module.
//!
//! A module arrives in one of three shapes: a fetched response (content
//! type plus a stream of body chunks), a complete byte buffer, or an
//! already-compiled module. Responses are instantiated from the stream
//! when possible, validating chunks as they arrive; a response whose
//! declared content type is not the wasm binary type is rejected up
//! front by the streaming path and retried through the buffered path,
//! with a single diagnostic warning.
//!
//! The loader is a one-shot state machine: `Unloaded` to `Loading` to
//! `Ready` or `Failed`. `Failed` is terminal; a new loader must be
//! constructed to retry.

use crate::runtime::HostRuntime;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::io;
use std::sync::Arc;
use tplhost_core::error::{HostError, Result};
use tracing::{debug, warn};
use wasmparser::{Chunk, Parser, ValidPayload, Validator};
use wasmtime::Module;

/// Content type that permits streaming instantiation.
const WASM_CONTENT_TYPE: &str = "application/wasm";

/// A fetched module body: declared content type plus chunk stream.
pub struct ModuleResponse {
    /// Declared content type, if any.
    content_type: Option<String>,
    /// Body chunks in arrival order.
    body: BoxStream<'static, io::Result<Bytes>>,
}

impl ModuleResponse {
    /// Create a response from a content type and a chunk stream.
    pub fn new<S>(content_type: Option<String>, body: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            content_type,
            body: body.boxed(),
        }
    }

    /// Create a single-chunk response from a byte buffer.
    pub fn from_bytes(content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self::new(
            content_type.map(str::to_owned),
            futures::stream::once(async move { Ok(Bytes::from(bytes)) }),
        )
    }

    /// The declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Whether the declared media type is the wasm binary type.
    fn is_wasm_media_type(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                ct.split(';')
                    .next()
                    .unwrap_or(ct)
                    .trim()
                    .eq_ignore_ascii_case(WASM_CONTENT_TYPE)
            })
            .unwrap_or(false)
    }

    /// Buffer the entire remaining body.
    async fn collect(mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        while let Some(chunk) = self.body.next().await {
            let chunk = chunk.map_err(|e| HostError::Load {
                cause: format!("response body read failed: {e}"),
            })?;
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Where the module bytes come from.
pub enum ModuleSource {
    /// A fetched response; streaming instantiation is attempted first.
    Response(ModuleResponse),
    /// A complete byte buffer.
    Bytes(Vec<u8>),
    /// An already-compiled module.
    Precompiled(Module),
}

/// Which instantiation path produced the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantiationPath {
    /// Validated and compiled from the response stream.
    Streamed,
    /// Buffered fallback after the streaming path rejected the response.
    Buffered,
    /// Byte buffer or precompiled module; no streaming applies.
    Direct,
}

/// Loader lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No load attempted yet.
    Unloaded,
    /// A load is in progress.
    Loading,
    /// The module is compiled and ready to instantiate.
    Ready,
    /// The load failed; terminal.
    Failed,
}

impl LoadState {
    /// Short name for diagnostics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// A compiled module plus the path that produced it.
#[derive(Debug)]
pub struct ReadyModule {
    /// The compiled module.
    module: Module,
    /// The instantiation path taken.
    path: InstantiationPath,
}

impl ReadyModule {
    /// The compiled module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// The instantiation path taken.
    pub fn path(&self) -> InstantiationPath {
        self.path
    }
}

/// Outcome of a streaming attempt that may hand the response back.
enum StreamAttempt {
    /// Streaming succeeded.
    Done(Module),
    /// The response is not declared as wasm; body untouched.
    WrongContentType(ModuleResponse),
}

/// One-shot loader for the compiler module.
pub struct ModuleLoader {
    /// Shared runtime providing the engine and module cache.
    runtime: Arc<HostRuntime>,
    /// Current lifecycle state.
    state: LoadState,
}

impl ModuleLoader {
    /// Create a new loader over the given runtime.
    pub fn new(runtime: Arc<HostRuntime>) -> Self {
        Self {
            runtime,
            state: LoadState::Unloaded,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Load and compile the module from `source`.
    ///
    /// On failure the loader moves to the terminal `Failed` state and
    /// refuses further loads; construct a new loader to retry.
    pub async fn load(&mut self, source: ModuleSource) -> Result<ReadyModule> {
        if self.state != LoadState::Unloaded {
            return Err(HostError::LoaderSpent {
                state: self.state.as_str(),
            });
        }
        self.state = LoadState::Loading;

        match self.obtain(source).await {
            Ok(ready) => {
                self.state = LoadState::Ready;
                debug!(path = ?ready.path(), "compiler module ready");
                Ok(ready)
            }
            Err(err) => {
                self.state = LoadState::Failed;
                Err(err)
            }
        }
    }

    async fn obtain(&self, source: ModuleSource) -> Result<ReadyModule> {
        match source {
            ModuleSource::Precompiled(module) => Ok(ReadyModule {
                module,
                path: InstantiationPath::Direct,
            }),
            ModuleSource::Bytes(bytes) => {
                let module = self.runtime.compile("module-bytes", &bytes)?;
                Ok(ReadyModule {
                    module,
                    path: InstantiationPath::Direct,
                })
            }
            ModuleSource::Response(response) => match self.stream_compile(response).await? {
                StreamAttempt::Done(module) => Ok(ReadyModule {
                    module,
                    path: InstantiationPath::Streamed,
                }),
                StreamAttempt::WrongContentType(response) => {
                    warn!(
                        content_type = response.content_type().unwrap_or("<none>"),
                        "streaming instantiation rejected: response is not served as \
                         '{WASM_CONTENT_TYPE}'; falling back to buffered instantiation"
                    );
                    let bytes = response.collect().await?;
                    let module = self.runtime.compile("module-response", &bytes)?;
                    Ok(ReadyModule {
                        module,
                        path: InstantiationPath::Buffered,
                    })
                }
            },
        }
    }

    /// Validate the response incrementally and compile once complete.
    ///
    /// Rejects a wrong content type before consuming any of the body,
    /// so the caller can still buffer the stream for the fallback.
    async fn stream_compile(&self, response: ModuleResponse) -> Result<StreamAttempt> {
        if !response.is_wasm_media_type() {
            return Ok(StreamAttempt::WrongContentType(response));
        }

        let mut body = response.body;
        let mut parser = Parser::new(0);
        let mut validator = Validator::new();
        let mut module_bytes: Vec<u8> = Vec::new();
        let mut window: Vec<u8> = Vec::new();
        let mut eof = false;

        loop {
            let (payload, consumed) = match parser.parse(&window, eof) {
                Err(e) => {
                    return Err(HostError::Load {
                        cause: format!("streaming validation failed: {e}"),
                    })
                }
                Ok(Chunk::NeedMoreData(_)) => {
                    match body.next().await {
                        Some(Ok(chunk)) => {
                            module_bytes.extend_from_slice(&chunk);
                            window.extend_from_slice(&chunk);
                        }
                        Some(Err(e)) => {
                            return Err(HostError::Load {
                                cause: format!("response body read failed: {e}"),
                            })
                        }
                        None => eof = true,
                    }
                    continue;
                }
                Ok(Chunk::Parsed { consumed, payload }) => (payload, consumed),
            };

            let mut done = false;
            match validator.payload(&payload).map_err(|e| HostError::Load {
                cause: format!("streaming validation failed: {e}"),
            })? {
                ValidPayload::Func(func, func_body) => {
                    func.into_validator(Default::default())
                        .validate(&func_body)
                        .map_err(|e| HostError::Load {
                            cause: format!("streaming validation failed: {e}"),
                        })?;
                }
                ValidPayload::End(_) => done = true,
                _ => {}
            }

            window.drain(..consumed);
            if done {
                break;
            }
        }

        debug!(bytes = module_bytes.len(), "streamed module validated");
        let module = self.runtime.compile("module-stream", &module_bytes)?;
        Ok(StreamAttempt::Done(module))
    }
}
