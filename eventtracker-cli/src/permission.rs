use dialoguer::Confirm;
use eventtracker_core::collab::{Capability, GrantStore, PermissionDecision, PermissionGate};
use owo_colors::OwoColorize;
use tracing::warn;

/// Asks on the terminal before granting, and remembers the answer if it was yes.
pub struct PromptingGate {
    grants: GrantStore,
}

impl PromptingGate {
    pub fn new(grants: GrantStore) -> Self {
        PromptingGate { grants }
    }
}

impl PermissionGate for PromptingGate {
    fn has_permission(&self, capability: Capability) -> bool {
        self.grants.has_permission(capability)
    }

    fn request_permission(&self, capability: Capability) -> PermissionDecision {
        if self.grants.has_permission(capability) {
            return PermissionDecision::Granted;
        }

        let approved = Confirm::new()
            .with_prompt(format!(
                "  Allow eventtracker to {}?",
                capability.description()
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !approved {
            eprintln!("  {}", "Permission denied".red());
            return PermissionDecision::Denied;
        }

        if let Err(e) = self.grants.grant(capability) {
            warn!(capability = %capability, error = %e, "could not remember permission");
        }
        PermissionDecision::Granted
    }
}
