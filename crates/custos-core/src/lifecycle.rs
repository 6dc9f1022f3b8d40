//! Start/stop protocol driven by the container.

/// A component the container starts at boot and stops at shutdown.
///
/// All methods take `&self`; implementations keep their running state behind
/// interior mutability so they can be stopped through a shared handle.
pub trait LifeCycle: Send + Sync {
    /// Starts the component. The default does nothing.
    fn start(&self) {}

    /// Stops the component, releasing everything it holds.
    fn stop(&self);

    /// Returns `true` while the component is running.
    fn is_running(&self) -> bool;

    /// Stops and restarts the component.
    fn refresh(&self) {
        self.stop();
        self.start();
    }
}
