//! Envelope for everything passed between pipeline stages

/// A stage either receives more data or learns the stream is over
#[derive(Clone, Debug, PartialEq)]
pub enum Message<T> {
    Data(T),
    EndOfStream,
}

impl<T> Message<T> {
    pub fn is_end(&self) -> bool {
        matches!(self, Message::EndOfStream)
    }
}
