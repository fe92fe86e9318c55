// Copyright 2025 coScene
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

// Backend credentials, sourced outside the configuration file

/// Credentials handed to a backend at connect time. Never part of the URI.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_token: Option<String>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none() && self.api_token.is_none()
    }
}

/// Source of backend credentials, injected into the backend factory so the
/// credential origin stays decoupled from backend logic.
pub trait SecretsProvider: Send + Sync {
    fn credentials(&self) -> Credentials;
}

/// Reads credentials from the process environment.
pub struct EnvSecrets;

impl SecretsProvider for EnvSecrets {
    fn credentials(&self) -> Credentials {
        Credentials {
            username: std::env::var("DATABASE_USER").ok(),
            password: std::env::var("DATABASE_PASSWORD").ok(),
            api_token: std::env::var("DATABASE_API_TOKEN").ok(),
        }
    }
}

/// Fixed credentials, used by tests and embedding callers.
pub struct StaticSecrets(pub Credentials);

impl SecretsProvider for StaticSecrets {
    fn credentials(&self) -> Credentials {
        self.0.clone()
    }
}
