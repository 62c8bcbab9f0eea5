use crate::command::Flags;
use crate::trigger::TriggerState;

/// Mutable protocol state for one device.
///
/// Lives as long as the device, so it carries over between commands and between
/// host connections. Only RESET with `reset_clears_session` puts it back to default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolSession {
    pub trigger: TriggerState,
    /// 24-bit rate divider, `rate = max_rate / (divider + 1)`
    pub divider: u32,
    /// Requested sample count, 0 until the host sets one
    pub read_count: u32,
    pub delay_count: u32,
    pub flags: Option<Flags>,
}

impl ProtocolSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_divider(&mut self, divider: u32) {
        self.divider = divider & 0x00ff_ffff;
    }

    /// SET_READ_DELAY_COUNT: both halves are sent minus one.
    pub fn set_read_delay_count(&mut self, read: u16, delay: u16) {
        self.read_count = read as u32 + 1;
        self.delay_count = delay as u32 + 1;
    }

    /// SET_BIG_READ_CNT: overrides the count from SET_READ_DELAY_COUNT.
    pub fn set_big_read_count(&mut self, count: u32) {
        self.read_count = count.saturating_add(1);
    }

    pub fn read_count_is_set(&self) -> bool {
        self.read_count > 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
