use serde::Deserialize;
use serde::Serialize;

/// lifecycle of one worker slot within a race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SlotStatus {
    AwaitingStart = 0,
    Running = 1,
    FinishedOk = 2,
    FinishedFail = 3,
    EarlyKilled = 4,
    TimeoutKilled = 5,
    AwaitingStartEs = 6,
}

impl SlotStatus {
    pub fn from_u8(x: u8) -> Self {
        match x {
            0 => Self::AwaitingStart,
            1 => Self::Running,
            2 => Self::FinishedOk,
            3 => Self::FinishedFail,
            4 => Self::EarlyKilled,
            5 => Self::TimeoutKilled,
            6 => Self::AwaitingStartEs,
            _ => panic!("unknown slot status {}", x),
        }
    }

    /// the slot will see no further writes
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            Self::FinishedOk | Self::FinishedFail | Self::EarlyKilled | Self::TimeoutKilled
        )
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::FinishedOk | Self::FinishedFail)
    }
}
