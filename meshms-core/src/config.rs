//! Tunables the original C exposed through `config.debug.meshms` and friends.
//!
//! The bundle store and keyring own everything else; this crate only needs
//! the handful of knobs that shape MeshMS's own behaviour.

/// The seed strings concatenated around a hex-encoded private key to derive
/// the deterministic conversation-bundle keypair (spec §4.H). Kept
/// configurable so tests can use shorter, recognisable seeds.
#[derive(Debug, Clone)]
pub struct MeshmsConfig {
    /// Emit `log::debug!` traces for the major steps of ply reading,
    /// discovery and synchronisation, matching the original's
    /// `config.debug.meshms` gate.
    pub debug_logging: bool,
    pub conversation_bundle_seed_prefix: String,
    pub conversation_bundle_seed_suffix: String,
}

impl Default for MeshmsConfig {
    fn default() -> Self {
        Self {
            debug_logging: false,
            conversation_bundle_seed_prefix: "incorrection".to_owned(),
            conversation_bundle_seed_suffix: "concentrativeness".to_owned(),
        }
    }
}
