//! Typed construction options for sessions (AMBIENT STACK expansion: a
//! small `Options`/builder surface in place of free-floating constructor
//! parameters, matching the corpus's preference for explicit config
//! structs over ad hoc arguments).

/// Tunables shared by [`crate::session::ClientSession::spawn_with_options`]
/// and [`crate::session::ServerSession::spawn_with_options`].
///
/// There is no configuration *file* here — this is a library, not a
/// service binary — just a typed surface over the handful of knobs a
/// session construction actually has.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    read_buffer_size: usize,
}

impl SessionOptions {
    /// 8 KiB, matching the reference implementation's default read chunk.
    pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: Self::DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Builds a [`SessionOptions`]. Every field defaults to the same value
/// [`SessionOptions::default`] produces, so `SessionOptions::builder().build()`
/// is equivalent to `SessionOptions::default()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionOptionsBuilder {
    options: SessionOptionsInner,
}

#[derive(Clone, Copy, Debug)]
struct SessionOptionsInner {
    read_buffer_size: usize,
}

impl Default for SessionOptionsInner {
    fn default() -> Self {
        Self {
            read_buffer_size: SessionOptions::DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl SessionOptionsBuilder {
    /// Size of the buffer each read off the transport fills before being
    /// handed to the dialect's incremental decoder. Larger values reduce
    /// syscall overhead for high-throughput connections at the cost of
    /// per-session memory.
    #[must_use]
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        assert!(size > 0, "read_buffer_size must be non-zero");
        self.options.read_buffer_size = size;
        self
    }

    pub fn build(self) -> SessionOptions {
        SessionOptions {
            read_buffer_size: self.options.read_buffer_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_builder_with_no_overrides() {
        let default = SessionOptions::default();
        let built = SessionOptions::builder().build();
        assert_eq!(default.read_buffer_size(), built.read_buffer_size());
    }

    #[test]
    fn builder_overrides_the_read_buffer_size() {
        let options = SessionOptions::builder().read_buffer_size(4096).build();
        assert_eq!(options.read_buffer_size(), 4096);
    }

    #[test]
    #[should_panic(expected = "read_buffer_size must be non-zero")]
    fn zero_read_buffer_size_panics() {
        SessionOptions::builder().read_buffer_size(0).build();
    }
}
