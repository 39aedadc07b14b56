/// Application name
pub const APP_NAME: &str = "Haven";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Label of the field holding a person's full name. Link batches resolve
/// their endpoints through it.
pub const FULL_NAME_LABEL: &str = "full_name";

/// Keys of a projected person that always come from the record itself.
/// No field may take one of these as its label.
pub const RESERVED_LABELS: &[&str] = &["id", "date", "application_id"];

/// Subject types recorded on provenance entries.
pub const API_TYPE_PERSON: &str = "Refugee";
pub const API_TYPE_LINK: &str = "Link";
pub const API_TYPE_FIELD: &str = "Field";

/// Provenance note left when a token lacks the needed scope.
pub const BAD_TOKEN_ACCESS: &str = "Bad token access";

/// Provenance note left when no token could be resolved.
pub const UNKNOWN_TOKEN: &str = "Unknown token";

/// Bodies returned with a 403 on the external API.
pub const READ_FORBIDDEN: &str = "Your token can't be used to read data";
pub const SEND_FORBIDDEN: &str = "Your token can't be used to send data";

/// Prefix of the per-item failure note on batch writes.
pub const PERSON_CREATE_ERROR: &str = "Error while creating this refugee";
pub const LINK_CREATE_ERROR: &str = "Error while creating this link";

/// Provenance payload summaries are cut to this many bytes.
pub const MAX_LOGGED_PAYLOAD: usize = 4096;

/// Header carrying the external client's application id.
pub const APPLICATION_ID_HEADER: &str = "x-application-id";
