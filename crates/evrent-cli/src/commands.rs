//! One function per subcommand. Each prints plain text to stdout.

use anyhow::{Context as _, Result, bail};
use evrent_client::{Client, auth::Credentials, resource::ListQuery};
use evrent_core::{
  fleet::{Depot, Model},
  recency::CreatedAt,
};
use uuid::Uuid;

use crate::RecordKind;

pub async fn login(client: &Client, email: String, password: String) -> Result<()> {
  let session = client
    .login(&Credentials::new(email, password))
    .await
    .context("sign-in failed")?;
  match &session.identity {
    Some(identity) => println!("signed in as {} ({})", identity.display_name, identity.subject_id),
    None => println!("signed in"),
  }
  Ok(())
}

pub async fn logout(client: &Client) -> Result<()> {
  client.logout().await;
  println!("signed out");
  Ok(())
}

pub fn whoami(client: &Client) -> Result<()> {
  let session = client.session().snapshot();
  let Some(identity) = session.identity.as_ref() else {
    bail!("not signed in");
  };
  println!("{}", identity.display_name);
  println!("  id:   {}", identity.subject_id);
  if !identity.role.is_empty() {
    println!("  role: {}", identity.role);
  }
  Ok(())
}

pub async fn depots(client: &Client, page: u32, size: u32) -> Result<()> {
  ensure_signed_in(client)?;
  let page = client
    .resource::<Depot>()
    .list(&ListQuery::page(page, size))
    .await
    .context("failed to list depots")?;
  for depot in &page.items {
    println!(
      "{}  {}  {}",
      depot.id,
      depot.name,
      depot.province.as_deref().unwrap_or("-")
    );
  }
  println!("page {}/{} ({} depots)", page.page_number, page.total_pages, page.total_count);
  Ok(())
}

pub async fn models(client: &Client) -> Result<()> {
  ensure_signed_in(client)?;
  let models = client
    .resource::<Model>()
    .all()
    .await
    .context("failed to list models")?;
  for model in &models {
    println!("{}  {}", model.id, model.name);
  }
  Ok(())
}

pub async fn model_stats(client: &Client) -> Result<()> {
  ensure_signed_in(client)?;
  let stats = client
    .aggregations()
    .model_statistics()
    .await
    .context("failed to compute model statistics")?;

  println!("models:             {}", stats.total_models);
  match (stats.total_cars, stats.models_with_cars, stats.average_cars_per_model) {
    (Some(cars), Some(with_cars), Some(average)) => {
      println!("cars:               {cars}");
      println!("models with cars:   {with_cars}");
      println!("cars per model:     {average:.2}");
    }
    _ => println!("cars:               unavailable"),
  }
  Ok(())
}

pub async fn availability(client: &Client, model_id: Uuid, province: Option<&str>) -> Result<()> {
  ensure_signed_in(client)?;
  let depots = client
    .aggregations()
    .depots_by_model(model_id, province)
    .await
    .context("failed to load availability")?;
  if depots.is_empty() {
    println!("no depot has this model available");
  }
  for entry in depots {
    println!("{:>4}  {}  {}", entry.available, entry.depot.name, entry.depot.province.unwrap_or_default());
  }
  Ok(())
}

pub async fn order_totals(client: &Client, user_ids: &[Uuid]) -> Result<()> {
  ensure_signed_in(client)?;
  let totals = client.aggregations().user_order_totals(user_ids).await;
  for id in user_ids {
    println!("{id}  {}", totals.get(id).copied().unwrap_or(0));
  }
  Ok(())
}

pub async fn memberships(client: &Client, user_ids: &[Uuid]) -> Result<()> {
  ensure_signed_in(client)?;
  let memberships = client.aggregations().user_memberships(user_ids).await;
  for id in user_ids {
    match memberships.get(id).and_then(Option::as_ref) {
      Some(m) => println!("{id}  {}  spent {:.0}", m.tier_name, m.total_spent),
      None => println!("{id}  -"),
    }
  }
  Ok(())
}

pub async fn forecast(client: &Client, depot_id: Uuid) -> Result<()> {
  ensure_signed_in(client)?;
  let enriched = client
    .aggregations()
    .enriched_forecast(depot_id)
    .await
    .context("failed to load forecast")?;
  if let Some(expected) = enriched.forecast.expected_rentals {
    println!("expected rentals: {expected:.0}");
  }
  for line in &enriched.recommendations {
    let name = line.model_name.as_deref().unwrap_or("(unknown model)");
    print!("{:>+4}  {name}", line.recommendation.suggested_quantity);
    match &line.recommendation.reason {
      Some(reason) => println!("  {reason}"),
      None => println!(),
    }
  }
  Ok(())
}

pub async fn latest(client: &Client, kind: RecordKind, order_id: Uuid) -> Result<()> {
  ensure_signed_in(client)?;
  let aggregations = client.aggregations();
  let found = match kind {
    RecordKind::Handover => aggregations
      .latest_handover(order_id)
      .await?
      .map(|r| describe(r.id, &r)),
    RecordKind::Return => aggregations
      .latest_return(order_id)
      .await?
      .map(|r| describe(r.id, &r)),
    RecordKind::Settlement => aggregations
      .latest_settlement(order_id)
      .await?
      .map(|r| describe(r.id, &r)),
  };
  match found {
    Some(line) => println!("{line}"),
    None => println!("no {kind:?} record for order {order_id}"),
  }
  Ok(())
}

fn describe(id: Uuid, record: &impl CreatedAt) -> String { format!("{id}  created {}", record.created_at()) }

fn ensure_signed_in(client: &Client) -> Result<()> {
  if !client.session().is_authenticated() {
    bail!("not signed in; run `evrent login` first");
  }
  Ok(())
}
