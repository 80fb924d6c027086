//! Worker power command wire format.
//!
//! ```text
//! {"id":0,"jsonrpc":"2.0","method":"control_gpu","params":[-1,1]}\n
//!                                                           │  └─ 1 = on, 0 = off
//!                                                           └──── device index, -1 = all
//! ```

use serde::{Deserialize, Serialize};

use powermon_core::{CommandConfig, PowerAction, WorkerEndpoint};

/// A power command addressed to one worker. Built per fan-out and
/// consumed by the channel; nothing records its delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub target: WorkerEndpoint,
    pub action: PowerAction,
}

/// JSON-RPC request body as the workers expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub jsonrpc: String,
    pub method: String,
    pub params: [i32; 2],
}

/// Builds newline-terminated command frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEncoder {
    method: String,
    target_index: i32,
}

impl CommandEncoder {
    pub fn new(method: &str, target_index: i32) -> Self {
        Self {
            method: method.to_string(),
            target_index,
        }
    }

    pub fn from_config(config: &CommandConfig) -> Self {
        Self::new(&config.method, config.target_index)
    }

    pub fn request(&self, action: PowerAction) -> RpcRequest {
        RpcRequest {
            id: 0,
            jsonrpc: "2.0".to_string(),
            method: self.method.clone(),
            params: [self.target_index, action.flag()],
        }
    }

    /// Serialize the request for `action`, followed by `\n`.
    pub fn encode(&self, action: PowerAction) -> serde_json::Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(&self.request(action))?;
        frame.push(b'\n');
        Ok(frame)
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::from_config(&CommandConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disable_frame() {
        let frame = CommandEncoder::default().encode(PowerAction::Disable).unwrap();
        assert_eq!(
            String::from_utf8(frame).unwrap(),
            "{\"id\":0,\"jsonrpc\":\"2.0\",\"method\":\"control_gpu\",\"params\":[-1,0]}\n"
        );
    }

    #[test]
    fn enable_frame() {
        let frame = CommandEncoder::default().encode(PowerAction::Enable).unwrap();
        assert!(frame.ends_with(b"\"params\":[-1,1]}\n"));
    }

    #[test]
    fn custom_method_and_index() {
        let encoder = CommandEncoder::new("miner_power", 2);
        let request = encoder.request(PowerAction::Enable);
        assert_eq!(request.method, "miner_power");
        assert_eq!(request.params, [2, 1]);
    }

    #[test]
    fn single_line_frame() {
        let frame = CommandEncoder::default().encode(PowerAction::Enable).unwrap();
        let newlines = frame.iter().filter(|&&b| b == b'\n').count();
        assert_eq!(newlines, 1);
        let parsed: RpcRequest = serde_json::from_slice(&frame).unwrap();
        assert_eq!(parsed.id, 0);
        assert_eq!(parsed.jsonrpc, "2.0");
    }
}
