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

use jwt_simple::prelude::Claims;
use jwt_simple::prelude::Duration as JwtDuration;
use jwt_simple::prelude::HS256Key;
use jwt_simple::prelude::MACLike;
use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;
use tonic::Request;
use tonic::Status;

const CLAIM_SUBJECT: &str = "swarmdb-internal";

/// Mints short-lived HS256 tokens used to authenticate worker-to-worker
/// and coordinator-to-worker RPCs within the same cluster deployment.
#[derive(Clone)]
pub struct TokenIssuer {
    key: HS256Key,
    ttl_seconds: u64,
}

impl TokenIssuer {
    pub fn new(shared_secret: &[u8], ttl_seconds: u64) -> Self {
        TokenIssuer {
            key: HS256Key::from_bytes(shared_secret),
            ttl_seconds,
        }
    }

    pub fn issue(&self) -> Result<String, jwt_simple::Error> {
        let claims = Claims::create(JwtDuration::from_secs(self.ttl_seconds)).with_subject(CLAIM_SUBJECT);
        self.key.authenticate(claims)
    }

    fn verify(&self, token: &str) -> bool {
        self.key.verify_token::<jwt_simple::prelude::NoCustomClaims>(token, None).is_ok()
    }
}

/// A client-side interceptor that stamps every outbound request with a
/// freshly minted bearer token, and a matching server-side check
/// callable from a service's request handler. Verification is
/// deliberately not wired into tonic's own `Interceptor` trait on the
/// server side, since a verification failure there should map to
/// `ErrorCode::NotAuthorized` rather than tonic's default `Unauthenticated`.
#[derive(Clone)]
pub struct AuthInterceptor {
    issuer: TokenIssuer,
}

impl AuthInterceptor {
    pub fn new(issuer: TokenIssuer) -> Self {
        AuthInterceptor { issuer }
    }

    pub fn verify_metadata(&self, request: &tonic::metadata::MetadataMap) -> bool {
        match request.get("authorization").and_then(|v| v.to_str().ok()) {
            Some(header) => header
                .strip_prefix("Bearer ")
                .map(|token| self.issuer.verify(token))
                .unwrap_or(false),
            None => false,
        }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let token = self
            .issuer
            .issue()
            .map_err(|e| Status::internal(format!("failed to mint auth token: {}", e)))?;
        let value: MetadataValue<_> = format!("Bearer {}", token)
            .parse()
            .map_err(|_| Status::internal("invalid token header value"))?;
        request.metadata_mut().insert("authorization", value);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_against_the_same_secret() {
        let issuer = TokenIssuer::new(b"a shared cluster secret, 32+ bytes long", 60);
        let token = issuer.issue().unwrap();
        assert!(issuer.verify(&token));
    }

    #[test]
    fn token_does_not_verify_against_a_different_secret() {
        let issuer_a = TokenIssuer::new(b"secret-a-secret-a-secret-a-secret-a", 60);
        let issuer_b = TokenIssuer::new(b"secret-b-secret-b-secret-b-secret-b", 60);
        let token = issuer_a.issue().unwrap();
        assert!(!issuer_b.verify(&token));
    }

    #[test]
    fn interceptor_rejects_missing_authorization_header() {
        let issuer = TokenIssuer::new(b"a shared cluster secret, 32+ bytes long", 60);
        let interceptor = AuthInterceptor::new(issuer);
        let metadata = tonic::metadata::MetadataMap::new();
        assert!(!interceptor.verify_metadata(&metadata));
    }
}
