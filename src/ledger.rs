//! Purpose: In-memory mock ledger that applies batch items with simplified business rules.
//! Exports: `Ledger`.
//! Role: Development/test collaborator behind `ledgerbatch serve`; not the real ledger.
//! Invariants: Items apply in request order; each item is atomic (a failing item changes nothing).
//! Invariants: Exactly one raw outcome is produced per submitted item.
//! Notes: Codes follow the CHxxx taxonomy the client maps in `api::FailureCode`.
use std::collections::{HashMap, HashSet};

use ledgerbatch::api::{
    CreateAsset, CreateKey, FailureCode, ItemSpec, RawOutcome, Tags, UpdateAssetTags,
};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

const XPUB_HEX_LEN: usize = 64;

#[derive(Clone, Debug, Serialize)]
struct Asset {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    root_xpubs: Vec<String>,
    quorum: u32,
    tags: Tags,
    definition: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct Key {
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    xpub: String,
}

#[derive(Default)]
pub(crate) struct Ledger {
    assets: Vec<Asset>,
    asset_ids: HashMap<String, usize>,
    asset_aliases: HashMap<String, usize>,
    key_aliases: HashSet<String>,
    seq: u64,
}

impl Ledger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn apply_batch(&mut self, items: &[Value]) -> Vec<RawOutcome> {
        items.iter().map(|item| self.apply(item)).collect()
    }

    pub(crate) fn apply(&mut self, item: &Value) -> RawOutcome {
        let spec = match ItemSpec::from_value(item.clone()) {
            Ok(spec) => spec,
            Err(err) => {
                return failure(
                    FailureCode::BadRequest,
                    err.message().unwrap_or("invalid request body"),
                );
            }
        };
        let applied = match spec {
            ItemSpec::CreateAsset(spec) => self.create_asset(spec),
            ItemSpec::UpdateAssetTags(spec) => self.update_asset_tags(spec),
            ItemSpec::CreateKey(spec) => self.create_key(spec),
            ItemSpec::Other { op, .. } => Err(failure(
                FailureCode::BadRequest,
                &format!("unsupported op {op:?}"),
            )),
        };
        applied.unwrap_or_else(|rejected| rejected)
    }

    fn create_asset(&mut self, spec: CreateAsset) -> Result<RawOutcome, RawOutcome> {
        let root_xpubs = spec.root_xpubs.unwrap_or_default();
        if root_xpubs.is_empty() {
            return Err(failure(
                FailureCode::MissingRootXpubs,
                "At least one xpub is required",
            ));
        }
        if root_xpubs.iter().any(|xpub| !is_xpub(xpub)) {
            return Err(failure(FailureCode::InvalidXpub, "Invalid xpub format"));
        }
        let quorum = spec.quorum.unwrap_or(1);
        if quorum == 0 || quorum as usize > root_xpubs.len() {
            return Err(failure(
                FailureCode::InvalidQuorum,
                "Quorum must be greater than 0 and less than or equal to the number of xpubs",
            ));
        }
        if let Some(alias) = &spec.alias {
            if self.asset_aliases.contains_key(alias) {
                return Err(failure(FailureCode::DuplicateAlias, "Alias already exists"));
            }
        }

        self.seq += 1;
        let definition = spec.definition.unwrap_or_default();
        let id = asset_id(self.seq, &root_xpubs, quorum, &definition);
        let asset = Asset {
            id: id.clone(),
            alias: spec.alias,
            root_xpubs,
            quorum,
            tags: spec.tags.unwrap_or_default(),
            definition,
        };
        let payload = asset_json(&asset)?;
        let index = self.assets.len();
        if let Some(alias) = &asset.alias {
            self.asset_aliases.insert(alias.clone(), index);
        }
        self.asset_ids.insert(id, index);
        self.assets.push(asset);
        Ok(RawOutcome::ok(payload))
    }

    fn update_asset_tags(&mut self, spec: UpdateAssetTags) -> Result<RawOutcome, RawOutcome> {
        let index = match (&spec.id, &spec.alias) {
            (Some(id), None) => self.asset_ids.get(id),
            (None, Some(alias)) => self.asset_aliases.get(alias),
            _ => {
                return Err(failure(
                    FailureCode::AmbiguousTarget,
                    "Exactly one of id or alias must be specified",
                ));
            }
        };
        let Some(&index) = index else {
            return Err(failure(FailureCode::NotFound, "Asset not found"));
        };
        let mut updated = self.assets[index].clone();
        updated.tags = spec.tags.unwrap_or_default();
        let payload = asset_json(&updated)?;
        self.assets[index] = updated;
        Ok(RawOutcome::ok(payload))
    }

    fn create_key(&mut self, spec: CreateKey) -> Result<RawOutcome, RawOutcome> {
        if let Some(alias) = &spec.alias {
            if self.key_aliases.contains(alias) {
                return Err(failure(FailureCode::DuplicateAlias, "Alias already exists"));
            }
        }
        let mut seed = [0u8; XPUB_HEX_LEN / 2];
        getrandom::fill(&mut seed)
            .map_err(|_| failure(FailureCode::Internal, "key generation failed"))?;
        let key = Key {
            alias: spec.alias,
            xpub: hex(&seed),
        };
        let payload = serde_json::to_value(&key)
            .map_err(|_| failure(FailureCode::Internal, "failed to encode key"))?;
        if let Some(alias) = key.alias {
            self.key_aliases.insert(alias);
        }
        Ok(RawOutcome::ok(payload))
    }

    #[cfg(test)]
    fn asset_count(&self) -> usize {
        self.assets.len()
    }
}

fn failure(code: FailureCode, message: &str) -> RawOutcome {
    RawOutcome::error(code.as_str(), message)
}

fn asset_json(asset: &Asset) -> Result<Value, RawOutcome> {
    serde_json::to_value(asset).map_err(|_| failure(FailureCode::Internal, "failed to encode asset"))
}

fn is_xpub(value: &str) -> bool {
    value.len() == XPUB_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn asset_id(seq: u64, root_xpubs: &[String], quorum: u32, definition: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seq.to_be_bytes());
    for xpub in root_xpubs {
        hasher.update(xpub.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(quorum.to_be_bytes());
    hasher.update(Value::Object(definition.clone()).to_string().as_bytes());
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::Ledger;
    use ledgerbatch::api::{
        CreateAsset, CreateKey, ItemSpec, RawOutcome, UpdateAssetTags, encode_items,
    };
    use serde_json::{Value, json};

    fn code_of(outcome: &RawOutcome) -> Option<&str> {
        match outcome {
            RawOutcome::Error { code, .. } => code.as_deref(),
            RawOutcome::Ok { .. } => None,
        }
    }

    fn payload_of(outcome: &RawOutcome) -> &Value {
        match outcome {
            RawOutcome::Ok { payload } => payload,
            RawOutcome::Error { .. } => panic!("expected ok outcome, got {outcome:?}"),
        }
    }

    fn apply(ledger: &mut Ledger, items: Vec<ItemSpec>) -> Vec<RawOutcome> {
        let payloads = encode_items(&items).expect("encode");
        ledger.apply_batch(&payloads)
    }

    fn new_xpub(ledger: &mut Ledger) -> String {
        let outcomes = apply(ledger, vec![CreateKey::default().into()]);
        payload_of(&outcomes[0])["xpub"]
            .as_str()
            .expect("xpub")
            .to_string()
    }

    #[test]
    fn create_batch_rejects_only_the_item_without_xpubs() {
        let mut ledger = Ledger::new();
        let xpub = new_xpub(&mut ledger);
        let outcomes = apply(
            &mut ledger,
            vec![
                CreateAsset::new().alias("bronze").root_xpub(&xpub).quorum(1).into(),
                CreateAsset::new().alias("unobtanium").into(),
                CreateAsset::new().alias("copper").root_xpub(&xpub).quorum(1).into(),
            ],
        );
        assert_eq!(outcomes.len(), 3);
        assert_eq!(code_of(&outcomes[0]), None);
        assert_eq!(code_of(&outcomes[1]), Some("CH202"));
        assert_eq!(code_of(&outcomes[2]), None);
        assert_eq!(ledger.asset_count(), 2);
        assert_eq!(payload_of(&outcomes[0])["id"].as_str().map(str::len), Some(64));
    }

    #[test]
    fn duplicate_alias_within_one_batch_conflicts() {
        let mut ledger = Ledger::new();
        let xpub = new_xpub(&mut ledger);
        let outcomes = apply(
            &mut ledger,
            vec![
                CreateAsset::new().alias("gold").root_xpub(&xpub).into(),
                CreateAsset::new().alias("gold").root_xpub(&xpub).into(),
            ],
        );
        assert_eq!(code_of(&outcomes[0]), None);
        assert_eq!(code_of(&outcomes[1]), Some("CH050"));
    }

    #[test]
    fn quorum_and_xpub_format_are_checked() {
        let mut ledger = Ledger::new();
        let xpub = new_xpub(&mut ledger);
        let outcomes = apply(
            &mut ledger,
            vec![
                CreateAsset::new().root_xpub(&xpub).quorum(2).into(),
                CreateAsset::new().root_xpub(&xpub).quorum(0).into(),
                CreateAsset::new().root_xpub("not-hex").into(),
            ],
        );
        assert_eq!(code_of(&outcomes[0]), Some("CH200"));
        assert_eq!(code_of(&outcomes[1]), Some("CH200"));
        assert_eq!(code_of(&outcomes[2]), Some("CH201"));
        assert_eq!(ledger.asset_count(), 0);
    }

    #[test]
    fn tag_updates_need_exactly_one_target() {
        let mut ledger = Ledger::new();
        let xpub = new_xpub(&mut ledger);
        let created = apply(
            &mut ledger,
            vec![
                CreateAsset::new().root_xpub(&xpub).tag("x", "one").into(),
                CreateAsset::new().root_xpub(&xpub).tag("y", "one").into(),
                CreateAsset::new().root_xpub(&xpub).tag("z", "one").into(),
            ],
        );
        let ids: Vec<String> = created
            .iter()
            .map(|outcome| payload_of(outcome)["id"].as_str().expect("id").to_string())
            .collect();

        let mut redundant = UpdateAssetTags::by_id(&ids[2]).tag("z", "four");
        redundant.alias = Some("redundant_alias".to_string());
        let outcomes = apply(
            &mut ledger,
            vec![
                UpdateAssetTags::by_id(&ids[0]).tag("x", "four").into(),
                UpdateAssetTags::default().tag("y", "four").into(),
                UpdateAssetTags::by_id(&ids[1]).tag("y", "four").into(),
                redundant.into(),
            ],
        );
        assert_eq!(code_of(&outcomes[1]), Some("CH051"));
        assert_eq!(code_of(&outcomes[3]), Some("CH051"));
        assert_eq!(payload_of(&outcomes[0])["tags"], json!({"x": "four"}));
        assert_eq!(payload_of(&outcomes[2])["tags"], json!({"y": "four"}));
    }

    #[test]
    fn unknown_target_is_not_found() {
        let mut ledger = Ledger::new();
        let outcomes = apply(&mut ledger, vec![UpdateAssetTags::by_alias("ghost").into()]);
        assert_eq!(code_of(&outcomes[0]), Some("CH002"));
    }

    #[test]
    fn malformed_items_are_bad_requests() {
        let mut ledger = Ledger::new();
        let outcomes = ledger.apply_batch(&[
            json!(42),
            json!({"alias": "no-op"}),
            json!({"op": "create_account"}),
            json!({"op": "create_key", "unexpected": true}),
        ]);
        for outcome in &outcomes {
            assert_eq!(code_of(outcome), Some("CH003"));
        }
    }

    #[test]
    fn key_aliases_are_unique() {
        let mut ledger = Ledger::new();
        let outcomes = apply(
            &mut ledger,
            vec![
                CreateKey::with_alias("treasury").into(),
                CreateKey::with_alias("treasury").into(),
            ],
        );
        assert_eq!(payload_of(&outcomes[0])["alias"], "treasury");
        assert_eq!(
            payload_of(&outcomes[0])["xpub"].as_str().map(str::len),
            Some(64)
        );
        assert_eq!(code_of(&outcomes[1]), Some("CH050"));
    }
}
