//! Initialize a new pipefold project

use anyhow::Result;
use pipefold_core::config::CONFIG_FILE;
use std::fs;
use std::path::Path;

const CONFIG: &str = r#"# Pipefold project configuration
dirs:
  in: content
  out: public

data_types:
  posts:
    in: "posts/*.md"
    pre:
      - sort
    out:
      # Each view gets its own copy of the posts
      pages:
        - replace:
            pattern: "\\{\\{site\\}\\}"
            with: "My Site"
        - write:
            extension: html
      feed:
        - [log]
"#;

const SAMPLE_POST: &str = "# Hello\n\nWelcome to {{site}}.\n";

const GITIGNORE: &str = "# Build output\npublic/\n";

/// Run the init command
pub async fn run(path: &str) -> Result<()> {
    let project_dir = Path::new(path);

    if project_dir.join(CONFIG_FILE).exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {}",
            project_dir.display(),
            CONFIG_FILE
        );
    }

    fs::create_dir_all(project_dir.join("content/posts"))?;
    fs::write(project_dir.join(CONFIG_FILE), CONFIG)?;
    fs::write(project_dir.join("content/posts/hello.md"), SAMPLE_POST)?;
    fs::write(project_dir.join(".gitignore"), GITIGNORE)?;

    tracing::info!("✓ Created project at {}", project_dir.canonicalize()?.display());
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  pipefold validate    # Check configuration");
    tracing::info!("  pipefold build       # Run the pipeline");

    Ok(())
}
