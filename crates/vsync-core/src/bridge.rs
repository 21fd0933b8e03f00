//! Observed collection bridge
//!
//! Translates collection notifications into change records on the pending
//! batch. Added and changed both become `Set`; removed becomes `Remove`.

use std::sync::Arc;

use crate::batch::PendingBatch;
use crate::change::ChangeRecord;
use crate::collection::CollectionObserver;
use crate::resource::Resource;

pub struct BatchBridge<T> {
    batch: Arc<PendingBatch<T>>,
}

impl<T> BatchBridge<T> {
    pub fn new(batch: Arc<PendingBatch<T>>) -> Self {
        Self { batch }
    }
}

impl<T: Resource> CollectionObserver<T> for BatchBridge<T> {
    fn on_added(&self, entity: &T) {
        self.batch.append(ChangeRecord::set(entity.clone()));
    }

    fn on_changed(&self, entity: &T) {
        self.batch.append(ChangeRecord::set(entity.clone()));
    }

    fn on_removed(&self, entity: &T) {
        self.batch.append(ChangeRecord::remove(entity.clone()));
    }
}
