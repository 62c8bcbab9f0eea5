use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TriggerEdge {
    #[strum(to_string = "rising")]
    Rising,
    #[default]
    #[strum(to_string = "falling")]
    Falling,
}

/// Resolved trigger: which logical channel, and on which edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSpec {
    pub channel: u8,
    pub edge: TriggerEdge,
}

/// Index of the lowest set bit of `mask`, or `None` for an empty mask.
///
/// The hardware has a single trigger input, so every higher bit is ignored.
pub fn lowest_trigger_channel(mask: u16) -> Option<u8> {
    if mask == 0 {
        None
    } else {
        Some(mask.trailing_zeros() as u8)
    }
}

/// Edge selected by the level bit of `values` at `channel`.
pub fn edge_for(values: u16, channel: u8) -> TriggerEdge {
    if (values >> channel) & 1 == 1 {
        TriggerEdge::Rising
    } else {
        TriggerEdge::Falling
    }
}

/// Channel-A trigger state reduced from the last mask and value words.
///
/// Hosts must send VALUES after a non-zero MASK. Values that arrive while no
/// channel is selected are remembered but leave the edge untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerState {
    mask: u16,
    values: u16,
    channel: Option<u8>,
    edge: TriggerEdge,
}

impl TriggerState {
    pub fn set_mask(&mut self, mask: u16) {
        self.mask = mask;
        self.channel = lowest_trigger_channel(mask);
    }

    pub fn set_values(&mut self, values: u16) {
        self.values = values;
        if let Some(channel) = self.channel {
            self.edge = edge_for(values, channel);
        }
    }

    pub fn values(&self) -> u16 {
        self.values
    }

    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    pub fn edge(&self) -> TriggerEdge {
        self.edge
    }

    pub fn resolved(&self) -> Option<TriggerSpec> {
        self.channel.map(|channel| TriggerSpec {
            channel,
            edge: self.edge,
        })
    }
}
