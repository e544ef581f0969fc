//! Service definitions and type-erased method handlers.
//!
//! Methods are registered as typed async functions and erased at
//! registration time into [`MethodHandler`]s that work on raw payload bytes.
//! The serializer is picked per request, so the same handler serves every
//! registered payload format.
//!
//! # Example
//!
//! ```
//! use minirpc_server::{Outcome, ServiceDef};
//! use minirpc_common::Context;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct GetByIdReq {
//!     #[serde(rename = "Id")]
//!     id: i64,
//! }
//!
//! #[derive(Serialize)]
//! struct GetByIdResp {
//!     #[serde(rename = "Msg")]
//!     msg: String,
//! }
//!
//! let service = ServiceDef::new("user-service")
//!     .method("GetById", |_ctx: Context, req: GetByIdReq| async move {
//!         Ok::<_, String>(GetByIdResp { msg: format!("user {}", req.id) })
//!     })
//!     .method("GetWithWarning", |_ctx: Context, _req: GetByIdReq| async move {
//!         Outcome::both(GetByIdResp { msg: "stale".into() }, "cache miss")
//!     });
//!
//! assert_eq!(service.name(), "user-service");
//! assert!(service.get("GetById").is_some());
//! assert!(service.get("getbyid").is_none());
//! ```

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use minirpc_common::serialize::{self, Serializer};
use minirpc_common::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What an erased method produced: encoded payload and error text, either
/// of which may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutput {
    pub payload: Vec<u8>,
    pub error: Option<String>,
}

/// Result of a service method that may carry a value and an error together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: Option<T>,
    pub error: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn err(error: impl Display) -> Self {
        Self {
            value: None,
            error: Some(error.to_string()),
        }
    }

    pub fn both(value: T, error: impl Display) -> Self {
        Self {
            value: Some(value),
            error: Some(error.to_string()),
        }
    }
}

/// Conversion from a method's return value into an [`Outcome`].
pub trait IntoOutcome {
    type Value;

    fn into_outcome(self) -> Outcome<Self::Value>;
}

impl<T> IntoOutcome for Outcome<T> {
    type Value = T;

    fn into_outcome(self) -> Outcome<T> {
        self
    }
}

impl<T, E: Display> IntoOutcome for Result<T, E> {
    type Value = T;

    fn into_outcome(self) -> Outcome<T> {
        match self {
            Ok(value) => Outcome::ok(value),
            Err(e) => Outcome::err(e),
        }
    }
}

/// A method erased to bytes in, bytes out.
pub trait MethodHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context, serializer: Arc<dyn Serializer>, payload: Vec<u8>) -> BoxFuture<'static, HandlerOutput>;
}

/// Wrapper that decodes the argument and encodes the result around a typed
/// method.
struct TypedMethod<F, Req, Resp, Fut> {
    method: Arc<F>,
    _phantom: PhantomData<fn(Req) -> (Resp, Fut)>,
}

impl<F, Req, Resp, Fut> MethodHandler for TypedMethod<F, Req, Resp, Fut>
where
    F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome<Value = Resp>,
{
    fn call(&self, ctx: Context, serializer: Arc<dyn Serializer>, payload: Vec<u8>) -> BoxFuture<'static, HandlerOutput> {
        let req: Req = match serialize::decode(serializer.as_ref(), &payload) {
            Ok(req) => req,
            Err(e) => {
                return Box::pin(async move {
                    HandlerOutput {
                        payload: Vec::new(),
                        error: Some(e.to_string()),
                    }
                })
            }
        };

        let method = Arc::clone(&self.method);
        Box::pin(async move {
            let outcome = (*method)(ctx, req).await.into_outcome();
            let mut output = HandlerOutput {
                payload: Vec::new(),
                error: outcome.error,
            };
            if let Some(value) = outcome.value {
                match serialize::encode(serializer.as_ref(), &value) {
                    Ok(bytes) => output.payload = bytes,
                    Err(e) => {
                        output.error.get_or_insert_with(|| e.to_string());
                    }
                }
            }
            output
        })
    }
}

/// A named service and its methods.
///
/// Method names are matched case-sensitively.
pub struct ServiceDef {
    name: String,
    methods: HashMap<String, Arc<dyn MethodHandler>>,
}

impl ServiceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Adds a method. A later method with the same name replaces the earlier one.
    pub fn method<F, Req, Resp, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: IntoOutcome<Value = Resp>,
    {
        let handler = TypedMethod {
            method: Arc::new(method),
            _phantom: PhantomData,
        };
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    /// Adds an already erased method.
    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) -> Self {
        self.methods.insert(name.into(), handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.methods.get(method).cloned()
    }

    /// Method names in sorted order.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ServiceDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDef")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}
