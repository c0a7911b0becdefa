//! In-memory state backend.
//!
//! Values are stored bincode-encoded in ordered maps, so two backends with the
//! same contents produce byte-identical snapshots.

use super::*;

/// `(state name, key, namespace)`
type StateKey = (String, Vec<u8>, Vec<u8>);

/// In-memory state backend over a `BTreeMap`.
///
/// Does not support larger-than-memory state; it is the backend the engine
/// runs against in tests and in single-process deployments.
#[derive(Debug, Default)]
pub struct HashMapStateBackend {
    values: BTreeMap<StateKey, Vec<u8>>,
    /// Current processing key
    current_key: Option<Vec<u8>>,
}

impl HashMapStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values across all keys and names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn state_key(&self, name: &str, namespace: &[u8]) -> Result<StateKey> {
        let key = self
            .current_key
            .as_ref()
            .ok_or_else(|| anyhow!("No current key set"))?;
        Ok((name.to_string(), key.clone(), namespace.to_vec()))
    }
}

/// Snapshot container for checkpointing.
#[derive(Serialize, Deserialize)]
struct SnapshotData {
    values: BTreeMap<StateKey, Vec<u8>>,
}

impl KeyedStateBackend for HashMapStateBackend {
    fn set_current_key(&mut self, key: Vec<u8>) {
        self.current_key = Some(key);
    }

    fn current_key(&self) -> Option<&[u8]> {
        self.current_key.as_deref()
    }

    fn get_value<V: StreamData>(&self, name: &str, namespace: &[u8]) -> Result<Option<V>> {
        let state_key = self.state_key(name, namespace)?;
        match self.values.get(&state_key) {
            Some(bytes) => Ok(Some(
                bincode::deserialize(bytes).with_context(|| format!("decode state '{name}'"))?,
            )),
            None => Ok(None),
        }
    }

    fn put_value<V: StreamData>(&mut self, name: &str, namespace: &[u8], value: V) -> Result<()> {
        let state_key = self.state_key(name, namespace)?;
        let bytes = bincode::serialize(&value)?;
        self.values.insert(state_key, bytes);
        Ok(())
    }

    fn clear_value(&mut self, name: &str, namespace: &[u8]) -> Result<()> {
        let state_key = self.state_key(name, namespace)?;
        self.values.remove(&state_key);
        Ok(())
    }

    fn entries<V: StreamData>(&self, name: &str) -> Result<Vec<(Vec<u8>, Vec<u8>, V)>> {
        let from = (name.to_string(), Vec::new(), Vec::new());
        let mut out = Vec::new();
        for ((state_name, key, namespace), bytes) in self.values.range(from..) {
            if state_name != name {
                break;
            }
            let value = bincode::deserialize(bytes)
                .with_context(|| format!("decode state '{name}'"))?;
            out.push((key.clone(), namespace.clone(), value));
        }
        Ok(out)
    }

    fn clear_all(&mut self) {
        self.values.clear();
        self.current_key = None;
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        let data = SnapshotData {
            values: self.values.clone(),
        };
        bincode::serialize(&data).map_err(|e| anyhow!("Snapshot failed: {}", e))
    }

    fn restore(&mut self, data: &[u8]) -> Result<()> {
        let snap: SnapshotData =
            bincode::deserialize(data).map_err(|e| anyhow!("Restore failed: {}", e))?;
        self.values = snap.values;
        Ok(())
    }
}
