//! Parser for the episode download worker's text output.
//!
//! The worker redraws its progress bar with carriage returns and mixes
//! structured progress lines with free-form chatter, so consumers feed
//! raw stream chunks through a [`LineBuffer`] and classify each
//! completed line with [`classify_line`].

mod classify;
mod line_buffer;

pub use self::classify::classify_line;
pub use self::classify::EpisodeStatus;
pub use self::classify::ProgressEvent;
pub use self::classify::WorkerLine;
pub use self::line_buffer::LineBuffer;
