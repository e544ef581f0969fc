// Copyright 2025 minirpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # minirpc CLI
//!
//! Command-line demo for the minirpc framework.
//!
//! This crate holds the `user-service` demo shared by both halves of the
//! binary:
//!
//! - `minirpc serve`: runs a server exposing `user-service.GetById`
//! - `minirpc call`: calls `GetById` and prints the result as JSON

use std::sync::Arc;

use minirpc_client::{ServiceClient, Stub, StubBinder};
use minirpc_common::serialize::{BinarySerializer, JsonSerializer, Serializer};
use minirpc_common::Context;
use minirpc_server::ServiceDef;
use serde::{Deserialize, Serialize};

/// Name the demo service is registered under.
pub const USER_SERVICE: &str = "user-service";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetByIdReq {
    #[serde(rename = "Id")]
    pub id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetByIdResp {
    #[serde(rename = "Msg")]
    pub msg: String,
}

/// Builds the demo service. `GetById` answers every positive id with
/// `greeting` and rejects the rest.
pub fn user_service(greeting: impl Into<String>) -> ServiceDef {
    let greeting: Arc<str> = Arc::from(greeting.into());
    ServiceDef::new(USER_SERVICE).method("GetById", move |_ctx: Context, req: GetByIdReq| {
        let greeting = greeting.clone();
        async move {
            tracing::debug!(id = req.id, "GetById");
            if req.id <= 0 {
                return Err(format!("invalid id: {}", req.id));
            }
            Ok(GetByIdResp {
                msg: greeting.to_string(),
            })
        }
    })
}

/// Client-side descriptor for the demo service.
#[derive(Debug, Clone)]
pub struct UserServiceClient {
    pub get_by_id: Stub<GetByIdReq, GetByIdResp>,
}

impl ServiceClient for UserServiceClient {
    fn bind(binder: &StubBinder) -> Self {
        Self {
            get_by_id: binder.stub("GetById"),
        }
    }
}

/// Maps a serializer name given on the command line to a serializer.
pub fn parse_serializer(name: &str) -> anyhow::Result<Arc<dyn Serializer>> {
    match name {
        "json" => Ok(Arc::new(JsonSerializer)),
        "binary" => Ok(Arc::new(BinarySerializer)),
        other => Err(anyhow::anyhow!(
            "Invalid serializer '{}': expected 'json' or 'binary'",
            other
        )),
    }
}
