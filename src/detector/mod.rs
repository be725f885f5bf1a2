pub mod alert;
pub mod classifier;
pub mod sink;

pub use alert::AlertDebouncer;
pub use classifier::{classify, Suggestions};
pub use sink::{AlertSink, TerminalBell};
