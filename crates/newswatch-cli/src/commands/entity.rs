use anyhow::Result;

use newswatch_core::{
    entity::NewEntity,
    storage::{Database, EntityRepository},
};

/// Start tracking a Twitter account
pub async fn add(db: &Database, twitter_id: &str, name: &str) -> Result<()> {
    let repo = EntityRepository::new(db);

    if let Some(existing) = repo.find_by_external_id(twitter_id).await? {
        println!(
            "Already tracking {} as '{}'.",
            existing.external_id, existing.display_name
        );
        return Ok(());
    }

    let entity = repo
        .create(&NewEntity {
            external_id: twitter_id.to_string(),
            display_name: name.to_string(),
        })
        .await?;

    println!("Tracking {} ({})", entity.display_name, entity.external_id);
    Ok(())
}

pub async fn list(db: &Database) -> Result<()> {
    let entities = EntityRepository::new(db).list_all().await?;

    if entities.is_empty() {
        println!("No tracked entities yet.");
        println!("\nTo track an account, run:");
        println!("  newswatch entity add --twitter-id <id> --name <name>");
        return Ok(());
    }

    println!("Tracked entities ({}):\n", entities.len());
    for entity in &entities {
        println!("  {} - {}", entity.external_id, entity.display_name);
    }

    Ok(())
}

pub async fn remove(db: &Database, twitter_id: &str) -> Result<()> {
    if EntityRepository::new(db).delete_by_external_id(twitter_id).await? {
        println!("Stopped tracking: {}", twitter_id);
    } else {
        println!("Entity '{}' not found.", twitter_id);
        println!("Run 'newswatch entity list' to see tracked entities.");
    }

    Ok(())
}
