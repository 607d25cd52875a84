//! Terminal rendering of now-playing updates.

use std::io::{self, Write};
use std::path::Path;

use super::NowPlayingSink;

/// Prints updates as plain lines.
///
/// Write errors are ignored: a closed terminal must not stop playback.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl ConsoleSink<io::Stderr> {
    /// For when stdout carries the audio stream.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> NowPlayingSink for ConsoleSink<W> {
    fn preview(&mut self, artist: &str, song: &str) {
        let _ = writeln!(self.out, "♪ {artist} - {song}");
    }

    fn show(&mut self, artist: &str, song: &str, image: Option<&Path>) {
        let _ = match image {
            Some(image) => writeln!(self.out, "  cover: {}", image.display()),
            None => writeln!(self.out, "  no cover for {artist} - {song}"),
        };
        let _ = self.out.flush();
    }

    fn diagnostic(&mut self, message: &str) {
        let _ = writeln!(self.out, "! {message}");
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_output() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.preview("Jimi Hendrix", "The Wind Cries Mary");
        sink.show("Jimi Hendrix", "The Wind Cries Mary", Some(Path::new("/tmp/X.jpg")));
        sink.preview("Station", "ID");
        sink.show("Station", "ID", None);
        sink.diagnostic("stream failed");

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            text,
            "♪ Jimi Hendrix - The Wind Cries Mary\n  cover: /tmp/X.jpg\n♪ Station - ID\n  no cover for Station - ID\n! stream failed\n"
        );
    }
}
