pub mod loopback;
pub mod message;
pub mod queue;

pub use loopback::{ConnectError, LoopbackSession, LoopbackStats};
pub use message::{
    Broadcast, BroadcastKind, Command, CommandKind, CommandSource, Delivery, Envelope,
};
pub use queue::{BroadcastBus, BroadcastCounts, CommandApplyStats, CommandQueue};
