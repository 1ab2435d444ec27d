//! Outbound frame builders
//!
//! Convenience functions for building the bytes the controller expects.

use super::protocol::{MotionCommand, CONFIG_PREFIX, RECORD_SEPARATOR};

/// Build the configuration frame: `CONFIG:` + payload + RS
pub fn build_config_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CONFIG_PREFIX.len() + payload.len() + 1);
    frame.extend_from_slice(CONFIG_PREFIX);
    frame.extend_from_slice(payload);
    frame.push(RECORD_SEPARATOR);
    frame
}

/// Build an edge-mode state token (`"<digit>\n"`)
pub fn build_state_token(command: MotionCommand) -> [u8; 2] {
    [command.state_byte(), b'\n']
}

/// Build a held-mode key byte, `None` for stop
pub fn build_held_byte(command: MotionCommand) -> Option<[u8; 1]> {
    command.held_byte().map(|b| [b])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_frame() {
        let frame = build_config_frame(br#"{"x":1}"#);
        let mut expected = b"CONFIG:{\"x\":1}".to_vec();
        expected.push(0x1E);
        assert_eq!(frame, expected);
        assert_eq!(frame.iter().filter(|&&b| b == RECORD_SEPARATOR).count(), 1);
    }

    #[test]
    fn test_build_config_frame_empty_payload() {
        assert_eq!(build_config_frame(&[]), b"CONFIG:\x1E".to_vec());
    }

    #[test]
    fn test_build_state_token() {
        assert_eq!(&build_state_token(MotionCommand::Stop), b"0\n");
        assert_eq!(&build_state_token(MotionCommand::Left), b"2\n");
    }

    #[test]
    fn test_build_held_byte() {
        assert_eq!(build_held_byte(MotionCommand::Forward), Some(*b"w"));
        assert_eq!(build_held_byte(MotionCommand::Stop), None);
    }
}
