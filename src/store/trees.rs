pub const SETTINGS: &str = "settings";
