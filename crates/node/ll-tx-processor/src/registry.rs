use crate::TransactionProcessor;
use ll_primitives::transaction::TxType;
use std::collections::HashMap;

/// Processor registry error
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// More than one processor for the same transaction type
    #[error("Processor for transaction type {tx_type} is already registered")]
    DuplicateType {
        /// Transaction type
        tx_type: TxType,
    },
}

/// Builder for [`ProcessorRegistry`]
#[derive(Debug, Default)]
#[must_use]
pub struct ProcessorRegistryBuilder {
    processors: Vec<Box<dyn TransactionProcessor>>,
}

impl ProcessorRegistryBuilder {
    /// Register processor, processors are invoked in registration order
    pub fn with_processor<P>(mut self, processor: P) -> Self
    where
        P: TransactionProcessor,
    {
        self.processors.push(Box::new(processor));
        self
    }

    /// Build registry
    pub fn build(self) -> Result<ProcessorRegistry, RegistryError> {
        let mut by_type = HashMap::with_capacity(self.processors.len());
        for (index, processor) in self.processors.iter().enumerate() {
            let tx_type = processor.tx_type();
            if by_type.insert(tx_type, index).is_some() {
                return Err(RegistryError::DuplicateType { tx_type });
            }
        }

        Ok(ProcessorRegistry {
            processors: self.processors,
            by_type,
        })
    }
}

/// Processors by transaction type, in registration order
#[derive(Debug)]
pub struct ProcessorRegistry {
    processors: Vec<Box<dyn TransactionProcessor>>,
    by_type: HashMap<TxType, usize>,
}

impl ProcessorRegistry {
    /// Create registry builder
    pub fn builder() -> ProcessorRegistryBuilder {
        ProcessorRegistryBuilder::default()
    }

    /// Processor for transaction type
    pub fn get(&self, tx_type: TxType) -> Option<&dyn TransactionProcessor> {
        self.by_type
            .get(&tx_type)
            .map(|&index| self.processors[index].as_ref())
    }

    /// Whether there is a processor for transaction type
    pub fn contains(&self, tx_type: TxType) -> bool {
        self.by_type.contains_key(&tx_type)
    }

    /// Processors in registration order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &dyn TransactionProcessor> {
        self.processors.iter().map(AsRef::as_ref)
    }
}
