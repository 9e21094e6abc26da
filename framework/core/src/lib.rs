mod bail;
mod clock;
mod shutdown;

pub mod prelude {
    pub use crate::bail::WorkerBailError;
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
