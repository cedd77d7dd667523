//! System-wide constants and default paths.

/// Scheme prefix of every resource URN.
pub const URN_PREFIX: &str = "urn:stratum";

/// Separator between type tokens in a URN type chain.
pub const TYPE_SEPARATOR: &str = "$";

/// Separator between segments of a component path.
pub const PATH_SEPARATOR: &str = "/";

/// Default stack file looked up by the CLI.
pub const DEFAULT_STACK_FILE: &str = "stratum.yaml";

/// Default state file written by `stratum apply`.
pub const DEFAULT_STATE_FILE: &str = ".stratum/state.json";

/// Default stage when the stack file does not name one.
pub const DEFAULT_STAGE: &str = "dev";

/// Number of hex characters appended to truncated physical names.
pub const PHYSICAL_NAME_HASH_LEN: usize = 8;

/// Tag stored on credential secrets pointing at the instance they belong to.
pub const INSTANCE_REF_TAG: &str = "stratum:ref:instance";
