/// Callback invoked for each inbound text frame
pub type TextCallback = Box<dyn Fn(String) + Send + Sync>;

/// Callback invoked for each inbound binary frame
pub type BinaryCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Callback invoked once the connection is observed closed
pub type WsCloseCallback = Box<dyn Fn() + Send + Sync>;

/// A WebSocket connection between the client and the gateway.
///
/// Implementations may invoke the registered callbacks from any thread.
/// Callbacks registered later replace earlier ones; frames received before
/// a callback is registered may be dropped by the transport.
pub trait WebSocket: Send + Sync {
    /// Send a text frame.
    fn text(&self, message: String);

    /// Send a binary frame.
    fn binary(&self, message: Vec<u8>);

    /// Close the connection with the given status code.
    ///
    /// The close callback fires when the close is actually observed,
    /// which may be after this call returns.
    fn close(&self, code: u16);

    fn register_text_callback(&self, on_text: TextCallback);

    fn register_binary_callback(&self, on_binary: BinaryCallback);

    fn register_close_callback(&self, on_close: WsCloseCallback);
}
