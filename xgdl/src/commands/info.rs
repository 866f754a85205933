use anyhow::Context;

#[derive(Debug, argh::FromArgs)]
#[argh(
    subcommand,
    name = "info",
    description = "show the metadata and episode list for a title"
)]
pub struct Options {
    #[argh(positional, description = "the detail page url")]
    pub url: String,
}

pub async fn exec(client: xgcartoon::Client, options: Options) -> anyhow::Result<()> {
    let detail = client
        .get_detail(&options.url)
        .await
        .context("failed to get detail page")?;

    println!("{}", detail.title);
    println!("  id: {}", detail.cartoon_id);
    if !detail.status.is_empty() {
        println!("  status: {}", detail.status);
    }
    if !detail.update_date.is_empty() {
        println!("  updated: {}", detail.update_date);
    }
    if !detail.tags.is_empty() {
        println!("  tags: {}", detail.tags.join(", "));
    }
    if !detail.description.is_empty() {
        println!("  description: {}", detail.description);
    }

    for season in detail.seasons.iter() {
        println!();
        println!("{} ({} episodes)", season.name, season.episodes.len());
        for episode in season.episodes.iter() {
            println!("  {:>4} {}", episode.number, episode.title);
        }
    }

    Ok(())
}
