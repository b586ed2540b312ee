/// Backend-assigned row identifiers are opaque strings.
pub type EntityId = String;

/// Human-facing headset number painted on each device.
pub type BinocularNumber = i64;
