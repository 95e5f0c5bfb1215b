pub mod error;
pub mod memory_remote;
pub mod model;
pub mod persist;
pub mod relations;
pub mod remote;
pub mod search;
pub mod selection;
pub mod sled_remote;
pub mod store;
pub mod token_index;

pub use error::StoreError;
pub use model::*;
pub use relations::{plan_cascade_for_annotation_deletion, plan_removal_from_relation, CascadePlan, RelationChange};
pub use remote::{RemoteError, RemoteResult, RemoteStore};
pub use search::{search, SearchOptions, SearchResult, SearchSession};
pub use selection::{PageSelectionQueue, SelectionBuilder};
pub use store::{AnnotationStore, Notice, NoticeLevel, StoreConfig};
pub use token_index::{bounds_for_tokens, TokenIndex};
