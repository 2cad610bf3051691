/// Progress reporting capability, injected into the components that need it
/// instead of writing to shared static state. The host wires this up to its
/// own display; the default does nothing.
pub trait StatusReporter: Send + Sync + 'static {
    fn progress(&self, message: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatus;

impl StatusReporter for NullStatus {
    fn progress(&self, _message: &str) {}
}
