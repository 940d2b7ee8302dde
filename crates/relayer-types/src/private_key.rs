// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::str::FromStr;

use ethereum_types::Secret;
use serde::Deserialize;

/// A signing key, loaded from a `0x` prefixed hex string or from an
/// environment variable named with a leading `$`.
#[derive(Clone)]
pub struct PrivateKey(Secret);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<Secret> for PrivateKey {
    fn from(secret: Secret) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = Secret;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn parse_secret(hex: &str) -> Result<Secret, String> {
    Secret::from_str(hex).map_err(|e| {
        format!(
            "{e}: expected 66 characters including the 0x prefix, got {}",
            hex.len()
        )
    })
}

impl FromStr for PrivateKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let secret = if value.starts_with("0x") {
            parse_secret(value)?
        } else if let Some(var) = value.strip_prefix('$') {
            tracing::trace!("Reading private key from ${}", var);
            let hex = std::env::var(var)
                .map_err(|e| format!("cannot read env var {var}: {e}"))?;
            parse_secret(&hex)?
        } else {
            return Err("expected a 0x prefixed hex string or a $ENV_VAR".into());
        };
        Ok(PrivateKey(secret))
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        key: PrivateKey,
    }

    #[test]
    fn loads_hex_and_env_keys() {
        let hex = format!("0x{}", "11".repeat(32));
        let json = format!(r#"{{"key":"{hex}"}}"#);
        let h: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(h.key.as_bytes(), &[0x11; 32]);

        std::env::set_var("ROLLUP_RELAYER_TEST_KEY", &hex);
        let h: Holder =
            serde_json::from_str(r#"{"key":"$ROLLUP_RELAYER_TEST_KEY"}"#)
                .unwrap();
        assert_eq!(h.key.as_bytes(), &[0x11; 32]);
        assert_eq!(format!("{:?}", h.key), "PrivateKey");

        assert!(serde_json::from_str::<Holder>(r#"{"key":"abc"}"#).is_err());
    }
}
