//! # Patch Builder
//!
//! Builds ordered JSON-Patch (RFC 6902) documents for bulk key mutations of a
//! Secret's data map. No I/O happens here.
//!
//! One logical mutation always becomes one document so the API server applies
//! it all-or-nothing:
//!
//! ```text
//! [ {"op":"add","path":"/data","value":{}},        <- only when initializing
//!   {"op":"add","path":"/data/a","value":"<b64>"},
//!   {"op":"add","path":"/data/b","value":"<b64>"} ]
//! ```
//!
//! A document may be guarded with a leading `test` of
//! `/metadata/resourceVersion`, which makes the server reject it when the
//! object changed after it was read.
//!
//! Keys are pushed as JSON-Pointer tokens, so `/` and `~` inside a key are
//! escaped and a key always addresses exactly one member of the data map.

use crate::error::GatewayError;
use json_patch::{
    AddOperation, Patch, PatchOperation, RemoveOperation, ReplaceOperation, TestOperation,
};
use jsonptr::PointerBuf;
use k8s_openapi::ByteString;
use serde_json::{Map, Value};

/// JSON path of a Secret's data map
pub const SECRET_DATA_PATH: &str = "/data";

/// Kind of per-key operation emitted by the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Add,
    Replace,
    Remove,
}

/// Builder for patches addressed under a base container path
#[derive(Debug, Clone)]
pub struct PatchBuilder {
    base: PointerBuf,
}

impl Default for PatchBuilder {
    fn default() -> Self {
        Self::secret_data()
    }
}

impl PatchBuilder {
    /// Builder rooted at `/data`
    #[must_use]
    pub fn secret_data() -> Self {
        Self {
            base: PointerBuf::from_tokens(["data"]),
        }
    }

    /// Builder rooted at an arbitrary container path
    #[must_use]
    pub fn with_base(base: PointerBuf) -> Self {
        Self { base }
    }

    #[must_use]
    pub fn base(&self) -> &PointerBuf {
        &self.base
    }

    /// Path of a single key under the base container
    #[must_use]
    pub fn key_path(&self, key: &str) -> PointerBuf {
        let mut path = self.base.clone();
        path.push_back(key);
        path
    }

    /// One ADD per entry, in iteration order.
    ///
    /// With `initialize`, the document starts with an ADD of an empty map at
    /// the base path so that the per-key ADDs have a parent to land in.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if a value cannot be encoded.
    pub fn add<I, K, V>(&self, entries: I, initialize: bool) -> Result<Patch, GatewayError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let mut operations = Vec::new();
        if initialize {
            operations.push(PatchOperation::Add(AddOperation {
                path: self.base.clone(),
                value: Value::Object(Map::new()),
            }));
        }
        for (key, value) in entries {
            operations.push(PatchOperation::Add(AddOperation {
                path: self.key_path(key.as_ref()),
                value: encode_value(value.as_ref())?,
            }));
        }
        Ok(Patch(operations))
    }

    /// One REPLACE per entry, in iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if a value cannot be encoded.
    pub fn replace<I, K, V>(&self, entries: I) -> Result<Patch, GatewayError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let operations = entries
            .into_iter()
            .map(|(key, value)| {
                Ok(PatchOperation::Replace(ReplaceOperation {
                    path: self.key_path(key.as_ref()),
                    value: encode_value(value.as_ref())?,
                }))
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;
        Ok(Patch(operations))
    }

    /// One REMOVE per key, in iteration order.
    #[must_use]
    pub fn remove<I, K>(&self, keys: I) -> Patch
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        Patch(
            keys.into_iter()
                .map(|key| {
                    PatchOperation::Remove(RemoveOperation {
                        path: self.key_path(key.as_ref()),
                    })
                })
                .collect(),
        )
    }

    /// Prefix `patch` with a `test` that the object is still at `version`
    #[must_use]
    pub fn guarded(patch: Patch, version: &str) -> Patch {
        let mut operations = Vec::with_capacity(patch.0.len() + 1);
        operations.push(PatchOperation::Test(TestOperation {
            path: PointerBuf::from_tokens(["metadata", "resourceVersion"]),
            value: Value::String(version.to_string()),
        }));
        operations.extend(patch.0);
        Patch(operations)
    }

    /// Dispatch on `kind`; values are ignored for [`PatchKind::Remove`] and
    /// `initialize` only applies to [`PatchKind::Add`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if a value cannot be encoded.
    pub fn build<I, K, V>(
        &self,
        kind: PatchKind,
        entries: I,
        initialize: bool,
    ) -> Result<Patch, GatewayError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        match kind {
            PatchKind::Add => self.add(entries, initialize),
            PatchKind::Replace => self.replace(entries),
            PatchKind::Remove => Ok(self.remove(entries.into_iter().map(|(key, _)| key))),
        }
    }
}

/// Secret data values travel base64-encoded, exactly as `ByteString` serializes
fn encode_value(value: &[u8]) -> Result<Value, GatewayError> {
    Ok(serde_json::to_value(ByteString(value.to_vec()))?)
}
