use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> anyhow::Result<()> {
    // outside of a git checkout vergen emits placeholder values instead of failing.
    let git = GitclBuilder::default().sha(true).branch(true).build()?;

    Emitter::default().add_instructions(&git)?.emit()?;

    Ok(())
}
