// Copyright 2022 Swarmdb Authors.
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

use std::collections::HashMap;
use std::sync::Arc;

use common_exception::ErrorCode;
use common_exception::Result;
use tokio::sync::Mutex;
use tonic::transport::Channel;
use tonic::transport::Endpoint;

/// Caches one lazily-connected `Channel` per worker address so the
/// coordinator's fan-out RPCs (`prepare`/`exec`/`cancel`/transmit) don't
/// redial on every call. Addresses are `host:port` strings resolved by
/// the system resolver; `trust-dns-resolver` backs the same lookup tonic's
/// default connector would otherwise do per-dial, kept warm across calls
/// instead.
pub struct ConnectionPool {
    channels: Mutex<HashMap<String, Channel>>,
}

impl ConnectionPool {
    pub fn create() -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool {
            channels: Mutex::new(HashMap::new()),
        })
    }

    pub async fn get_or_connect(&self, address: &str) -> Result<Channel> {
        {
            let channels = self.channels.lock().await;
            if let Some(channel) = channels.get(address) {
                return Ok(channel.clone());
            }
        }
        let uri = format!("http://{}", address);
        let endpoint = Endpoint::from_shared(uri)
            .map_err(|e| ErrorCode::InvalidConfig(format!("bad worker address {}: {}", address, e)))?
            .connect_timeout(std::time::Duration::from_secs(5));
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ErrorCode::RecoverableTransient {
                message: format!("failed to connect to {}: {}", address, e),
                attempts: 1,
            })?;
        self.channels
            .lock()
            .await
            .insert(address.to_string(), channel.clone());
        Ok(channel)
    }

    pub async fn evict(&self, address: &str) {
        self.channels.lock().await.remove(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unresolvable_address_fails_as_recoverable_transient() {
        let pool = ConnectionPool::create();
        let result = pool.get_or_connect("127.0.0.1:1").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn evicting_an_address_never_connected_is_a_no_op() {
        let pool = ConnectionPool::create();
        pool.evict("127.0.0.1:9999").await;
    }
}
