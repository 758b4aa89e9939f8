use std::convert::TryFrom;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Ack = 0,
    Data = 1,
    Fin = 2,
}

impl FrameKind {
    pub fn is_sequenced(self) -> bool {
        matches!(self, FrameKind::Data | FrameKind::Fin)
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameKind::Ack),
            1 => Ok(FrameKind::Data),
            2 => Ok(FrameKind::Fin),
            _ => Err(()),
        }
    }
}
