// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

//! Credential profiles: loading, delegation chains, and session resolution.

pub mod error;
mod ini;
pub mod resolver;
pub mod session;
pub mod store;

pub use error::{AssumeRoleError, ConfigError, ResolutionError};
pub use resolver::{generate_session_name, ProfileResolver, RoleAssumer, DEFAULT_REFRESH_MARGIN};
pub use session::{AssumedCredentials, Credentials, Session};
pub use store::{Profile, ProfileKind, ProfileStore, StaticKeys};
