use anyhow::ensure;
use anyhow::Context;

#[derive(Debug, argh::FromArgs)]
#[argh(subcommand, name = "search", description = "search for a title")]
pub struct Options {
    #[argh(positional, description = "the search query")]
    pub query: String,
}

pub async fn exec(client: xgcartoon::Client, options: Options) -> anyhow::Result<()> {
    let results = client
        .search(&options.query)
        .await
        .context("failed to search")?;
    ensure!(!results.entries.is_empty(), "no results");

    for entry in results.entries.iter() {
        println!("{}", entry.title);
        println!("  url: {}", entry.detail_url);
        if !entry.image.is_empty() {
            println!("  image: {}", entry.image);
        }
        if !entry.tags.is_empty() {
            println!("  tags: {}", entry.tags.join(", "));
        }
        if !entry.author.is_empty() {
            println!("  author: {}", entry.author);
        }
        println!();
    }

    Ok(())
}
