//! Typed call stubs bound to a service by name.
//!
//! A service descriptor is a plain struct with one [`Stub`] per method. It
//! implements [`ServiceClient`] to say which method name each stub calls:
//!
//! ```rust,no_run
//! use minirpc_client::{Client, ServiceClient, Stub, StubBinder};
//! use minirpc_common::Context;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize)]
//! struct GetByIdReq {
//!     #[serde(rename = "Id")]
//!     id: i64,
//! }
//!
//! #[derive(Default, Deserialize)]
//! struct GetByIdResp {
//!     #[serde(rename = "Msg")]
//!     msg: String,
//! }
//!
//! struct UserService {
//!     get_by_id: Stub<GetByIdReq, GetByIdResp>,
//! }
//!
//! impl ServiceClient for UserService {
//!     fn bind(binder: &StubBinder) -> Self {
//!         Self {
//!             get_by_id: binder.stub("GetById"),
//!         }
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect("127.0.0.1:8081").await?;
//! let users: UserService = client.init_service("user-service");
//! let resp = users.get_by_id.call(&Context::background(), &GetByIdReq { id: 123 }).await.into_result()?;
//! println!("{}", resp.msg);
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use minirpc_common::protocol::error::{MinirpcError, Result};
use minirpc_common::protocol::Request;
use minirpc_common::serialize::{self, Serializer};
use minirpc_common::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::Client;

/// A client-side service descriptor.
pub trait ServiceClient: Sized {
    /// Builds the descriptor, creating one stub per method.
    fn bind(binder: &StubBinder) -> Self;
}

/// Creates stubs for one service on one client.
pub struct StubBinder {
    client: Client,
    service_name: Arc<str>,
    serializer: Arc<dyn Serializer>,
}

impl StubBinder {
    pub fn new(client: Client, service_name: &str, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            client,
            service_name: Arc::from(service_name),
            serializer,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    /// Creates the stub for `method_name`. Method names match case-sensitively.
    pub fn stub<Req, Resp>(&self, method_name: &str) -> Stub<Req, Resp> {
        Stub {
            client: self.client.clone(),
            service_name: self.service_name.clone(),
            method_name: Arc::from(method_name),
            serializer: self.serializer.clone(),
            _marker: PhantomData,
        }
    }
}

/// The outcome of a stub call.
///
/// A remote method may return a value and an error together, so both are
/// kept. When the call fails before a response arrives, `value` is the
/// default.
#[derive(Debug)]
pub struct Reply<T> {
    pub value: T,
    pub error: Option<MinirpcError>,
}

impl<T> Reply<T> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Discards the value when an error is present.
    pub fn into_result(self) -> Result<T> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

impl<T: Default> Reply<T> {
    fn failed(err: MinirpcError) -> Self {
        Self {
            value: T::default(),
            error: Some(err),
        }
    }
}

/// A typed call slot for one remote method.
pub struct Stub<Req, Resp> {
    client: Client,
    service_name: Arc<str>,
    method_name: Arc<str>,
    serializer: Arc<dyn Serializer>,
    _marker: PhantomData<fn(&Req) -> Resp>,
}

impl<Req, Resp> Stub<Req, Resp> {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }
}

impl<Req, Resp> Stub<Req, Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned + Default,
{
    /// Calls the remote method.
    ///
    /// The argument is encoded with the stub's serializer, whose code is
    /// written into the request so the server decodes it the same way.
    pub async fn call(&self, ctx: &Context, req: &Req) -> Reply<Resp> {
        let payload = match serialize::encode(self.serializer.as_ref(), req) {
            Ok(payload) => payload,
            Err(e) => return Reply::failed(e),
        };

        let request = Request::new(&*self.service_name, &*self.method_name)
            .with_serializer(self.serializer.code())
            .with_payload(payload);

        let response = match self.client.invoke(ctx, request).await {
            Ok(response) => response,
            Err(e) => return Reply::failed(e),
        };

        let value = if response.payload.is_empty() {
            Resp::default()
        } else {
            match serialize::decode(self.serializer.as_ref(), &response.payload) {
                Ok(value) => value,
                Err(e) => return Reply::failed(e),
            }
        };

        Reply {
            value,
            error: response.error_message().map(MinirpcError::Remote),
        }
    }
}

impl<Req, Resp> Clone for Stub<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            service_name: self.service_name.clone(),
            method_name: self.method_name.clone(),
            serializer: self.serializer.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp> std::fmt::Debug for Stub<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stub")
            .field("service", &self.service_name)
            .field("method", &self.method_name)
            .field("serializer", &self.serializer.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minirpc_common::protocol::Response;
    use minirpc_common::serialize::{BinarySerializer, JsonSerializer};
    use minirpc_common::transport::TcpServer;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize)]
    struct GetByIdReq {
        #[serde(rename = "Id")]
        id: i64,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct GetByIdResp {
        #[serde(rename = "Msg")]
        msg: String,
    }

    struct UserService {
        get_by_id: Stub<GetByIdReq, GetByIdResp>,
        missing: Stub<GetByIdReq, GetByIdResp>,
    }

    impl ServiceClient for UserService {
        fn bind(binder: &StubBinder) -> Self {
            Self {
                get_by_id: binder.stub("GetById"),
                missing: binder.stub("Missing"),
            }
        }
    }

    /// Answers `GetById` in whichever serializer the request names, and
    /// `Missing` with an error only.
    async fn user_server() -> String {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            server
                .run_with_handler(|request: Request| async move {
                    let response = Response::for_request(&request);
                    if request.is_oneway() {
                        return None;
                    }
                    if request.method_name != "GetById" {
                        return Some(response.with_error("method not found"));
                    }
                    let resp = GetByIdResp { msg: "hello, world".into() };
                    let payload = match request.serializer {
                        2 => serialize::encode(&BinarySerializer, &resp).unwrap(),
                        _ => serialize::encode(&JsonSerializer, &resp).unwrap(),
                    };
                    Some(response.with_payload(payload))
                })
                .await
        });
        addr
    }

    #[tokio::test]
    async fn test_stub_names() {
        let addr = user_server().await;
        let client = Client::connect(&addr).await.unwrap();
        let users: UserService = client.init_service("user-service");
        assert_eq!(users.get_by_id.service_name(), "user-service");
        assert_eq!(users.get_by_id.method_name(), "GetById");
    }

    #[tokio::test]
    async fn test_call_json() {
        let addr = user_server().await;
        let client = Client::connect(&addr).await.unwrap();
        let users: UserService = client.init_service("user-service");

        let reply = users
            .get_by_id
            .call(&Context::background(), &GetByIdReq { id: 123 })
            .await;
        assert!(reply.is_ok(), "{:?}", reply.error);
        assert_eq!(reply.value.msg, "hello, world");
    }

    #[tokio::test]
    async fn test_call_binary() {
        let addr = user_server().await;
        let client = Client::connect(&addr).await.unwrap();
        let users: UserService = client.init_service_with("user-service", Arc::new(BinarySerializer));

        let resp = users
            .get_by_id
            .call(&Context::background(), &GetByIdReq { id: 123 })
            .await
            .into_result()
            .unwrap();
        assert_eq!(resp.msg, "hello, world");
    }

    #[tokio::test]
    async fn test_remote_error_without_payload() {
        let addr = user_server().await;
        let client = Client::connect(&addr).await.unwrap();
        let users: UserService = client.init_service("user-service");

        let reply = users.missing.call(&Context::background(), &GetByIdReq { id: 1 }).await;
        assert_eq!(reply.value, GetByIdResp::default());
        match reply.error {
            Some(MinirpcError::Remote(msg)) => assert_eq!(msg, "method not found"),
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oneway_gives_default_value() {
        let addr = user_server().await;
        let client = Client::connect(&addr).await.unwrap();
        let users: UserService = client.init_service("user-service");

        let ctx = Context::background().with_oneway();
        let reply = users.get_by_id.call(&ctx, &GetByIdReq { id: 123 }).await;
        assert_eq!(reply.value, GetByIdResp::default());
        assert!(matches!(reply.error, Some(MinirpcError::Oneway)));
    }

    #[tokio::test]
    async fn test_decode_failure_reported() {
        let addr = user_server().await;
        let client = Client::connect(&addr).await.unwrap();
        let binder = StubBinder::new(client, "user-service", Arc::new(JsonSerializer));
        let stub: Stub<Value, Vec<u32>> = binder.stub("GetById");

        let reply = stub.call(&Context::background(), &json!({"Id": 1})).await;
        assert!(reply.value.is_empty());
        assert!(matches!(reply.error, Some(MinirpcError::Decoding(_))));
    }

    #[tokio::test]
    async fn test_expired_context_fails_fast() {
        let addr = user_server().await;
        let client = Client::connect(&addr).await.unwrap();
        let users: UserService = client.init_service("user-service");

        let ctx = Context::background().with_timeout(Duration::ZERO);
        let reply = users.get_by_id.call(&ctx, &GetByIdReq { id: 123 }).await;
        assert!(matches!(reply.error, Some(MinirpcError::DeadlineExceeded)));
    }

    #[test]
    fn test_reply_into_result() {
        let ok: Reply<u8> = Reply { value: 5, error: None };
        assert_eq!(ok.into_result().unwrap(), 5);

        let both: Reply<u8> = Reply {
            value: 5,
            error: Some(MinirpcError::Remote("mock error".into())),
        };
        assert!(matches!(both.into_result(), Err(MinirpcError::Remote(_))));
    }
}
