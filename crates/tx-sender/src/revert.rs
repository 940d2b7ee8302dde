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

use rollup_relayer_utils::Error;

/// Tells permanent reverts (no retry can ever succeed) from transient ones.
///
/// A revert is permanent when its reason contains, ignoring case, one of
/// the configured reasons.
#[derive(Debug, Clone, Default)]
pub struct RevertClassifier {
    permanent_reasons: Vec<String>,
}

impl RevertClassifier {
    pub fn new<I, R>(permanent_reasons: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        let permanent_reasons = permanent_reasons
            .into_iter()
            .map(|r| r.as_ref().trim().to_lowercase())
            .filter(|r| !r.is_empty())
            .collect();
        Self { permanent_reasons }
    }

    pub fn is_permanent(&self, reason: &str) -> bool {
        let reason = reason.to_lowercase();
        self.permanent_reasons
            .iter()
            .any(|known| reason.contains(known.as_str()))
    }

    /// The [`Error::Revert`] for `reason`.
    pub fn classify(&self, reason: &str) -> Error {
        Error::Revert {
            reason: reason.to_string(),
            permanent: self.is_permanent(reason),
        }
    }
}
