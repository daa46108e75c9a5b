//! Discovery document served at `/.well-known/agent-card.json`.
//!
//! The card is rendered once at startup from configuration alone; no clock
//! or entropy feeds it, so two hosts with the same configuration serve
//! byte-identical documents. Key order is fixed, which is why the document
//! is rendered by hand instead of through a sorting serializer.

use solver_core::SolverConfig;

/// Sentinel for the execute endpoint of non-interactive deployments.
pub const EXECUTE_SENTINEL: &str = "N/A";

/// Renders the agent card for this deployment.
#[must_use]
pub fn render(config: &SolverConfig) -> String {
    let capabilities = config
        .policy
        .jobtype_allowlist
        .iter()
        .map(|job| format!("\"{job}\""))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        concat!(
            "{{",
            "\"agentId\":\"{agent_id}\",",
            "\"name\":\"{name}\",",
            "\"description\":\"Deterministic solver producing content-addressed evidence bundles\",",
            "\"version\":\"{version}\",",
            "\"capabilities\":[{capabilities}],",
            "\"endpoints\":{{\"health\":\"/healthz\",\"metrics\":\"/metrics\",\"execute\":\"{execute}\"}},",
            "\"supportedTrust\":[\"evidence-manifest-sha256\",\"receipt-secp256k1\"],",
            "\"links\":{{\"documentation\":\"https://docs.rs/solver-core\",\"repository\":\"https://github.com/solver/solver\"}},",
            "\"standards\":[\"RFC 8785\",\"RFC 6979\",\"EIP-2\"]",
            "}}"
        ),
        agent_id = env!("CARGO_PKG_NAME"),
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        capabilities = capabilities,
        execute = EXECUTE_SENTINEL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> String {
        render(&SolverConfig::default())
    }

    #[test]
    fn test_card_is_valid_json_with_fixed_key_order() {
        let card = card();
        let parsed: serde_json::Value = serde_json::from_str(&card).unwrap();
        assert_eq!(parsed["endpoints"]["execute"], EXECUTE_SENTINEL);
        assert_eq!(parsed["capabilities"][0], "SAFE_REPORT");

        // Key order is part of the contract.
        let agent_pos = card.find("\"agentId\"").unwrap();
        let name_pos = card.find("\"name\"").unwrap();
        let endpoints_pos = card.find("\"endpoints\"").unwrap();
        let standards_pos = card.find("\"standards\"").unwrap();
        assert!(agent_pos < name_pos);
        assert!(name_pos < endpoints_pos);
        assert!(endpoints_pos < standards_pos);
    }

    #[test]
    fn test_card_is_pure() {
        assert_eq!(card(), card());
    }
}
