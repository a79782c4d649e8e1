use std::sync::Arc;

use super::Connection;
use crate::buffer::PooledBuffer;

// -----------------------------------------------------------------------------
// ----- NetworkHandler --------------------------------------------------------

/// Application callbacks. They run on the connection's own tasks, so a
/// slow callback only delays that connection; they must never block
/// indefinitely.
pub trait NetworkHandler: Send + Sync + 'static {
    /// A connection was accepted (server) or established (client). Sending
    /// from here is allowed.
    fn on_connected(&self, _connection: &Arc<Connection>) {}

    /// One message arrived. The buffer goes back to its pool when dropped.
    fn on_message(&self, connection: &Arc<Connection>, buffer: PooledBuffer);

    /// Fired exactly once per connection that saw `on_connected`, on the
    /// same task as `on_message`; no `on_message` follows it.
    fn on_disconnected(&self, _connection: &Arc<Connection>) {}
}
