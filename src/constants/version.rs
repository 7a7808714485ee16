use semver::Version;

const REPOSITORY_URL: &str = "https://github.com/quotesayaka/quotesayaka";

pub fn get_version() -> String {
    let semver = env!("CARGO_PKG_VERSION").parse::<Version>();
    let sha = env!("VERGEN_GIT_SHA");

    match semver {
        // vergen writes this placeholder when it can't reach git, e.g. in CI
        Ok(semver) if sha == "VERGEN_IDEMPOTENT_OUTPUT" => semver.to_string(),
        Ok(semver) => format!("{} [[`{}`]({}/commit/{})]", semver, sha, REPOSITORY_URL, sha),
        Err(e) => {
            tracing::warn!(err = ?e, "couldn't parse a semver out of Cargo.toml? defaulting to 0.0.0-unknown.");
            String::from("0.0.0-unknown")
        }
    }
}
