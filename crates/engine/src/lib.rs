pub mod controller;
pub mod poloniex;
pub mod status;

pub use controller::{StateCheck, TickAction, TradingController};
pub use poloniex::PoloniexClient;
pub use status::{
    run_display, LogSink, StatusBoard, StatusChannel, StatusPublisher, StatusReceiver,
    StatusSink, StatusValue, TerminalSink,
};
