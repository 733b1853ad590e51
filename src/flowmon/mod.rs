//! Flow monitoring.
//!
//! A passive tap on every datagram send, receive and drop. The monitor
//! aggregates per-flow counters during the run; [`report`] reads the
//! written statistics back for analysis.

pub mod monitor;
pub mod probe;
pub mod report;

pub use monitor::{
    write_report, DropCount, FlowKey, FlowMetrics, FlowMonitor, FlowMonitorConfig, FlowMonitorReport, FlowRecord, FlowStats,
    Histogram, RunMetadata,
};
pub use probe::{DropReason, NullTap, PacketTap};
pub use report::{client_loss, generate_text_report, read_report, summarize, ClientLoss, FlowSummary, ReportError};
