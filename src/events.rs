use crate::message::{MessageId, Role};

pub type GenerationId = u64;

/// How a generation left the `Sending` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEnd {
    Completed,
    Cancelled,
    Failed(String),
}

/// Change notification for conversation observers.
///
/// Delivered through a broadcast channel, so slow observers may miss events
/// and should re-read the snapshot when they lag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    MessageAppended {
        id: MessageId,
        role: Role,
    },
    DeltaApplied {
        id: MessageId,
        delta: String,
    },
    MessageRemoved {
        id: MessageId,
    },
    GenerationStarted {
        generation: GenerationId,
        model: String,
        target: MessageId,
    },
    GenerationEnded {
        generation: GenerationId,
        end: GenerationEnd,
    },
    Cleared,
    Loaded {
        count: usize,
    },
    ModelChanged {
        model: String,
    },
}
