use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use tracing::{debug, info};

use crate::error::CodecResult;
use crate::record::{DynRecord, FactoryTable, LocalId, Record, RecordTypeId};


/// Creates records of a single type from their serialized form
pub trait RecordFactory: Send + Sync + 'static {
    fn record_type(&self) -> RecordTypeId;

    fn deser(&self, buf: &mut &[u8]) -> CodecResult<Box<dyn DynRecord>>;
}

struct TypedFactory<R: Record> {
    pd: PhantomData<fn() -> R>,
}

impl <R: Record> RecordFactory for TypedFactory<R> {
    fn record_type(&self) -> RecordTypeId {
        R::TYPE_ID
    }

    fn deser(&self, buf: &mut &[u8]) -> CodecResult<Box<dyn DynRecord>> {
        Ok(Box::new(R::deser(buf)?))
    }
}


/// The set of all record types an application knows about. It is populated once at startup
///  (replacing registration through static initializers) and is the source for building
///  per-connection [FactoryTable]s.
#[derive(Default, Clone)]
pub struct RecordRegistry {
    factories: BTreeMap<RecordTypeId, Arc<dyn RecordFactory>>,
}

impl RecordRegistry {
    pub fn new() -> RecordRegistry {
        Default::default()
    }

    pub fn register<R: Record>(&mut self) -> anyhow::Result<()> {
        self.register_factory(Arc::new(TypedFactory::<R> { pd: PhantomData }))
    }

    /// builder-style registration
    pub fn with<R: Record>(mut self) -> anyhow::Result<RecordRegistry> {
        self.register::<R>()?;
        Ok(self)
    }

    pub fn register_factory(&mut self, factory: Arc<dyn RecordFactory>) -> anyhow::Result<()> {
        match self.factories.entry(factory.record_type()) {
            Entry::Occupied(e) => {
                Err(anyhow!("registering a second record factory for record type {:?}", e.key()))
            }
            Entry::Vacant(e) => {
                debug!("registering record type {:?}", e.key());
                e.insert(factory);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn contains(&self, record_type: RecordTypeId) -> bool {
        self.factories.contains_key(&record_type)
    }

    /// Builds a factory table containing all registered record types, ordered by type id. Two
    ///  peers with identical registries derive identical local ids this way.
    pub fn build_table(&self) -> anyhow::Result<FactoryTable> {
        Self::check_table_size(self.factories.len())?;

        info!("building factory table with all {} registered record types", self.factories.len());
        Ok(FactoryTable::new(self.factories.values().cloned().collect()))
    }

    /// Builds a factory table for an explicitly negotiated list of record types: the n-th entry
    ///  of the list gets local id n.
    pub fn build_table_for(&self, record_types: &[RecordTypeId]) -> anyhow::Result<FactoryTable> {
        Self::check_table_size(record_types.len())?;

        let mut factories: Vec<Arc<dyn RecordFactory>> = Vec::with_capacity(record_types.len());
        for (idx, record_type) in record_types.iter().enumerate() {
            if record_types[..idx].contains(record_type) {
                bail!("record type {:?} is listed twice", record_type);
            }

            let factory = self.factories.get(record_type)
                .ok_or_else(|| anyhow!("record type {:?} is not registered", record_type))?;
            factories.push(factory.clone());
        }

        info!("building factory table for {} negotiated record types", factories.len());
        Ok(FactoryTable::new(factories))
    }

    fn check_table_size(len: usize) -> anyhow::Result<()> {
        if len > LocalId::MAX as usize + 1 {
            bail!("{} record types do not fit into the local id range", len);
        }
        Ok(())
    }
}
