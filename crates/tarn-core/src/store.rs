use crate::{
    error::StoreError,
    record::{DataFile, DataRecord},
};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

///
/// Store
///
/// Per-table record persistence. `load` must be called before `get_all` or
/// `save` within the same owner. `save` is atomic for the table: the
/// mutator runs against the live file and either every change lands or none.
///

pub trait Store {
    fn load(&self) -> Result<(), StoreError>;

    fn save(&self, mutate: &mut dyn FnMut(&mut DataFile)) -> Result<(), StoreError>;

    fn get_all(&self) -> Result<Vec<DataRecord>, StoreError>;
}

///
/// StoreProvider
///
/// Factory handing out a store handle per table name. Implementations may
/// back handles with files, memory, or a network database.
///

pub trait StoreProvider {
    type Handle: Store;

    fn store(&self, table: &str) -> Self::Handle;
}

///
/// MemoryStoreProvider
///
/// Reference `StoreProvider` backed by a shared in-memory file map. Files
/// are created empty on first touch. This is the store used by the test
/// suite and by embedders that do not need durability.
///

#[derive(Clone, Debug, Default)]
pub struct MemoryStoreProvider {
    files: Rc<RefCell<BTreeMap<String, DataFile>>>,
}

impl MemoryStoreProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with records; created/updated stamps are preserved.
    pub fn seed(&self, table: &str, records: Vec<DataRecord>) {
        let mut files = self.files.borrow_mut();
        let updated = records.iter().map(|r| r.updated).max().unwrap_or(0);
        files.insert(table.to_lowercase(), DataFile { updated, data: records });
    }

    /// Snapshot a table's file for inspection.
    #[must_use]
    pub fn snapshot(&self, table: &str) -> DataFile {
        self.files
            .borrow()
            .get(&table.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

impl StoreProvider for MemoryStoreProvider {
    type Handle = MemoryStore;

    fn store(&self, table: &str) -> MemoryStore {
        MemoryStore {
            files: Rc::clone(&self.files),
            table: table.to_lowercase(),
        }
    }
}

///
/// MemoryStore
///

#[derive(Clone, Debug)]
pub struct MemoryStore {
    files: Rc<RefCell<BTreeMap<String, DataFile>>>,
    table: String,
}

impl Store for MemoryStore {
    fn load(&self) -> Result<(), StoreError> {
        let mut files = self.files.borrow_mut();
        files.entry(self.table.clone()).or_default();

        Ok(())
    }

    fn save(&self, mutate: &mut dyn FnMut(&mut DataFile)) -> Result<(), StoreError> {
        let mut files = self.files.borrow_mut();
        let file = files.entry(self.table.clone()).or_default();
        mutate(file);

        Ok(())
    }

    fn get_all(&self) -> Result<Vec<DataRecord>, StoreError> {
        let files = self.files.borrow();
        Ok(files.get(&self.table).map(|f| f.data.clone()).unwrap_or_default())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::collections::BTreeMap;

    fn rec(id: &str) -> DataRecord {
        let mut fields = BTreeMap::new();
        fields.insert("n".to_string(), Value::from(id));
        DataRecord::new(id, 10, fields)
    }

    #[test]
    fn untouched_tables_read_as_empty() {
        let provider = MemoryStoreProvider::new();
        let store = provider.store("ghost");
        store.load().expect("load");
        assert!(store.get_all().expect("rows").is_empty());
    }

    #[test]
    fn handles_share_one_backing_map() {
        let provider = MemoryStoreProvider::new();
        provider.seed("t", vec![rec("a")]);

        let one = provider.store("T");
        let two = provider.store("t");
        one.save(&mut |file| file.data.push(rec("b"))).expect("save");

        assert_eq!(two.get_all().expect("rows").len(), 2);
    }

    #[test]
    fn save_mutations_are_visible_in_snapshots() {
        let provider = MemoryStoreProvider::new();
        let store = provider.store("t");
        store
            .save(&mut |file| {
                file.data.push(rec("a"));
                file.updated = 99;
            })
            .expect("save");

        let snapshot = provider.snapshot("t");
        assert_eq!(snapshot.updated, 99);
        assert_eq!(snapshot.data.len(), 1);
    }
}
