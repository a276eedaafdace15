pub const API_KEY_HEADER: &str = "api-key";

pub const SECURE_SCHEME: &str = "wss";
pub const DEFAULT_MODEL: &str = "gpt-4o-transcribe";
