/// State of a [`ProgressiveDecoder`](crate::ProgressiveDecoder) session.
///
/// `DecodeFinished` and `Error` are terminal: a new image may be loaded
/// from either of them, but from no other state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodeStatus {
    /// Header parsed; frame count not yet requested.
    FrameReady,
    /// Frame counting paused waiting for input.
    FrameToBeContinued,
    /// Frames counted; `start_decode` may be called.
    DecodeReady,
    /// Decoding in progress; call `continue_decode` again.
    DecodeToBeContinued,
    DecodeFinished,
    Error,
}

impl DecodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DecodeFinished | Self::Error)
    }
}

impl Default for DecodeStatus {
    fn default() -> Self {
        Self::DecodeFinished
    }
}
