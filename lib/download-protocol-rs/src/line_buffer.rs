/// Reassembles chunked worker output into complete lines.
///
/// The worker terminates lines with `\n` but also redraws in place with
/// `\r`, so runs of either character end a line. The trailing fragment
/// of a chunk is carried over and never emitted until terminated.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, returning the lines it completed.
    ///
    /// Lines are trimmed of surrounding whitespace; empty lines are
    /// dropped.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(index) = self.buffer.find(['\r', '\n']) {
            let line = self.buffer[..index].trim().to_string();
            self.buffer = self.buffer[index..]
                .trim_start_matches(['\r', '\n'])
                .to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }

        lines
    }
}
