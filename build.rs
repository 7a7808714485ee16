use anyhow::Error;
use vergen_gitcl::{Emitter, GitclBuilder};

/// embeds the git sha shown by `status`. a `VERGEN_GIT_SHA` already set in the environment
/// (e.g. by a docker build without `.git`) wins over asking git.
pub fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=migrations");
    println!("cargo:rerun-if-env-changed=VERGEN_GIT_SHA");

    match std::env::var("VERGEN_GIT_SHA") {
        Ok(sha) if !sha.is_empty() && sha != "unknown" => {
            println!("cargo:rustc-env=VERGEN_GIT_SHA={sha}");
        }
        _ => {
            let gitcl = GitclBuilder::default().sha(true).build()?;
            Emitter::default().add_instructions(&gitcl)?.emit()?;
        }
    }

    Ok(())
}
