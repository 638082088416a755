use std::path::Path;

use anyhow::Result;

/// Interface of the external deployment collaborator.
///
/// The orchestrator provisions the database stack, uploads the handler
/// artifacts, triggers seeding once, and publishes the static UI. The core
/// never calls these operations; they call into the core's entry points
/// (`demobank seed`, then the HTTP surface).
pub trait DeploymentOrchestrator {
    /// Create the artifact bucket if it does not exist.
    fn ensure_bucket(&self) -> Result<()>;

    /// Package a source file and upload it under the given key.
    fn package_and_upload(&self, source: &Path, dest_key: &str) -> Result<()>;

    /// Provision compute and network resources from an infrastructure
    /// template.
    fn deploy_template(&self, stack_name: &str, parameters: &[(String, String)]) -> Result<()>;

    /// Invoke the seeding entry point exactly once after the stack is up.
    fn invoke_seed_function(&self) -> Result<()>;

    /// Publish the static single-page UI to the website endpoint.
    fn publish_static_site(&self, html_file: &Path) -> Result<()>;
}
