//! Purpose: Typed per-operation item descriptors submitted in a batch.
//! Exports: `ItemSpec`, `CreateAsset`, `UpdateAssetTags`, `CreateKey`, `Tags`.
//! Role: Caller-facing schema; the encoder turns these into wire payloads.
//! Invariants: Optional fields stay optional; the ledger owns business validation.
//! Invariants: An item has no identity beyond its position in the batch.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{Error, ErrorKind};

pub type Tags = Map<String, Value>;

pub const OP_CREATE_ASSET: &str = "create_asset";
pub const OP_UPDATE_ASSET_TAGS: &str = "update_asset_tags";
pub const OP_CREATE_KEY: &str = "create_key";

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAsset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_xpubs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAssetTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ItemSpec {
    CreateAsset(CreateAsset),
    UpdateAssetTags(UpdateAssetTags),
    CreateKey(CreateKey),
    /// Operation kinds this client has no schema for yet.
    Other { op: String, fields: Map<String, Value> },
}

impl ItemSpec {
    pub fn op(&self) -> &str {
        match self {
            ItemSpec::CreateAsset(_) => OP_CREATE_ASSET,
            ItemSpec::UpdateAssetTags(_) => OP_UPDATE_ASSET_TAGS,
            ItemSpec::CreateKey(_) => OP_CREATE_KEY,
            ItemSpec::Other { op, .. } => op,
        }
    }

    /// Parse one `{"op": ..., ...}` object. Known ops reject unknown fields.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let Value::Object(mut fields) = value else {
            return Err(Error::new(ErrorKind::Usage).with_message("batch item must be a JSON object"));
        };
        let op = match fields.remove("op") {
            Some(Value::String(op)) => op,
            Some(_) => {
                return Err(Error::new(ErrorKind::Usage).with_message("item \"op\" must be a string"));
            }
            None => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("item is missing \"op\"")
                    .with_hint("Add an op such as \"create_asset\" or \"update_asset_tags\"."));
            }
        };
        let item = match op.as_str() {
            OP_CREATE_ASSET => ItemSpec::CreateAsset(parse_fields(&op, fields)?),
            OP_UPDATE_ASSET_TAGS => ItemSpec::UpdateAssetTags(parse_fields(&op, fields)?),
            OP_CREATE_KEY => ItemSpec::CreateKey(parse_fields(&op, fields)?),
            _ => ItemSpec::Other { op, fields },
        };
        Ok(item)
    }
}

impl From<CreateAsset> for ItemSpec {
    fn from(spec: CreateAsset) -> Self {
        ItemSpec::CreateAsset(spec)
    }
}

impl From<UpdateAssetTags> for ItemSpec {
    fn from(spec: UpdateAssetTags) -> Self {
        ItemSpec::UpdateAssetTags(spec)
    }
}

impl From<CreateKey> for ItemSpec {
    fn from(spec: CreateKey) -> Self {
        ItemSpec::CreateKey(spec)
    }
}

impl CreateAsset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn root_xpub(mut self, xpub: impl Into<String>) -> Self {
        self.root_xpubs.get_or_insert_with(Vec::new).push(xpub.into());
        self
    }

    pub fn quorum(mut self, quorum: u32) -> Self {
        self.quorum = Some(quorum);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn definition(mut self, definition: Map<String, Value>) -> Self {
        self.definition = Some(definition);
        self
    }
}

impl UpdateAssetTags {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_alias(alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..Self::default()
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

impl CreateKey {
    pub fn with_alias(alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
        }
    }
}

fn parse_fields<T>(op: &str, fields: Map<String, Value>) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(Value::Object(fields)).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid fields for op \"{op}\""))
            .with_source(err)
    })
}
