pub mod record;
pub mod session;
pub mod work_item;

pub use record::{MemoryRecord, ObservationRecord, SummaryRecord};
pub use session::{ActiveSession, SessionSnapshot, SessionState};
pub use work_item::{PendingMessage, WorkItem};

pub use recall_ai::{ObservationInput, SummaryInput};
