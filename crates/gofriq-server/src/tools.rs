//! Tool routing and handlers.
//!
//! `POST /tools/{name}` with a flat JSON argument object. Every payload
//! may carry `auth_tokens: [string]`; handlers resolve those to permitted
//! groups before touching any service. Responses always use the
//! [`Envelope`] shape with HTTP 200 — transport-level errors are reserved
//! for malformed JSON.

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use gofriq::models::{ClientProfile, QueryFilters, ScoringWeights, Source, SourceType, TrustLevel};
use gofriq::{Error, Result};

use gofriq_neo4j::{ExploreResult, NodeLabel, RelationType};
use gofriq_services::{GroupService, IngestRequest};
use gofriq_store::SourceUpdate;

use crate::envelope::Envelope;
use crate::state::AppState;

/// Build the tool-surface router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tools/:name", post(dispatch))
        .with_state(state)
}

fn parse_args<T: for<'de> Deserialize<'de>>(body: &Value) -> Result<T> {
    serde_json::from_value(body.clone())
        .map_err(|e| Error::validation(format!("invalid arguments: {e}")))
}

fn auth_tokens(body: &Value) -> Vec<String> {
    body.get("auth_tokens")
        .and_then(Value::as_array)
        .map(|tokens| {
            tokens.iter().filter_map(Value::as_str).map(str::to_string).collect()
        })
        .unwrap_or_default()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::internal(format!("serialize failed: {e}")))
}

async fn dispatch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Json<Envelope> {
    let tokens = auth_tokens(&body);
    let result = match name.as_str() {
        "ingest_document" => ingest_document(&state, &tokens, &body).await,
        "validate_document" => validate_document(&state, &tokens, &body).await,
        "list_sources" => list_sources(&state, &tokens, &body),
        "get_source" => get_source(&state, &tokens, &body),
        "create_source" => create_source(&state, &tokens, &body).await,
        "update_source" => update_source(&state, &tokens, &body).await,
        "delete_source" => delete_source(&state, &tokens, &body).await,
        "get_document" => get_document(&state, &tokens, &body),
        "delete_document" => delete_document(&state, &tokens, &body).await,
        "query_documents" => query_documents(&state, &tokens, &body).await,
        "get_client_avatar_feed" => client_avatar_feed(&state, &tokens, &body).await,
        "get_top_client_news" => top_client_news(&state, &tokens, &body).await,
        "create_client" => create_client(&state, &tokens, &body).await,
        "add_to_portfolio" => add_to_portfolio(&state, &tokens, &body).await,
        "add_to_watchlist" => add_to_watchlist(&state, &tokens, &body).await,
        "get_client_profile" => get_client_profile(&state, &tokens, &body).await,
        "update_client_profile" => update_client_profile(&state, &tokens, &body).await,
        "list_clients" => list_clients(&state, &tokens, &body).await,
        "explore_graph" => explore_graph(&state, &tokens, &body).await,
        "get_market_context" => market_context(&state, &tokens, &body).await,
        "health_check" => health_check(&state).await,
        unknown => Err(Error::validation(format!("unknown tool: {unknown}"))),
    };
    Json(result.into())
}

// ---- ingestion ----

#[derive(Deserialize)]
struct IngestArgs {
    title: String,
    content: String,
    source_id: Uuid,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, Value>>,
}

async fn ingest_document(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: IngestArgs = parse_args(body)?;
    let (group_name, group_guid) = state.groups.resolve_write_group(tokens)?;

    let result = state
        .ingest
        .ingest(
            IngestRequest {
                title: args.title,
                content: args.content,
                source_guid: args.source_id,
                group_guid,
                language: args.language,
                metadata: args.metadata,
            },
            &[group_name],
        )
        .await?;

    Ok(json!({
        "doc_id": result.doc_guid,
        "status": result.status,
        "language": result.language,
        "word_count": result.word_count,
        "duplicate_of": result.duplicate_of,
    }))
}

async fn validate_document(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: IngestArgs = parse_args(body)?;
    let (_, group_guid) = state.groups.resolve_write_group(tokens)?;

    let report = state
        .ingest
        .validate(&IngestRequest {
            title: args.title,
            content: args.content,
            source_guid: args.source_id,
            group_guid,
            language: args.language,
            metadata: args.metadata,
        })
        .await?;
    to_json(&report)
}

// ---- sources ----

#[derive(Deserialize)]
struct ListSourcesArgs {
    #[serde(default)]
    group_id: Option<Uuid>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default = "default_true")]
    active_only: bool,
}

fn default_true() -> bool {
    true
}

fn list_sources(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: ListSourcesArgs = parse_args(body)?;
    let permitted = state.groups.resolve_permitted_group_ids(tokens);

    if let Some(group) = args.group_id {
        if !permitted.contains(&group) {
            return Err(Error::AccessDenied(format!("group {group} is not permitted")));
        }
    }
    let source_type = args
        .source_type
        .as_deref()
        .map(|t| {
            SourceType::parse(t)
                .ok_or_else(|| Error::validation(format!("unknown source_type: {t}")))
        })
        .transpose()?;

    let sources: Vec<Source> = state
        .registry
        .list_sources(args.group_id, args.region.as_deref(), source_type, !args.active_only)?
        .into_iter()
        .filter(|s| permitted.contains(&s.group_guid))
        .collect();
    let count = sources.len();
    Ok(json!({"sources": sources, "count": count}))
}

#[derive(Deserialize)]
struct SourceIdArgs {
    source_id: Uuid,
}

fn get_source(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: SourceIdArgs = parse_args(body)?;
    let permitted = state.groups.resolve_permitted_group_ids(tokens);
    let source = state.registry.get(args.source_id, Some(&permitted))?;
    to_json(&source)
}

#[derive(Deserialize)]
struct CreateSourceArgs {
    name: String,
    source_type: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    languages: Option<Vec<String>>,
    #[serde(default)]
    trust_level: Option<String>,
}

async fn create_source(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: CreateSourceArgs = parse_args(body)?;
    let (group_name, group_guid) = state.groups.resolve_write_group(tokens)?;

    let source_type = SourceType::parse(&args.source_type)
        .ok_or_else(|| Error::validation(format!("unknown source_type: {}", args.source_type)))?;
    let trust_level = match args.trust_level.as_deref() {
        Some(raw) => TrustLevel::parse(raw)
            .ok_or_else(|| Error::validation(format!("unknown trust_level: {raw}")))?,
        None => TrustLevel::Unverified,
    };

    let mut source = Source::new(group_guid, args.name, source_type, trust_level)?;
    source.region = args.region;
    if let Some(languages) = args.languages {
        source.set_languages(languages);
    }

    let created = state.registry.create(source, &[group_name.clone()]).await?;
    if let Err(e) = state.audit.log_source_create(&[group_name], created.source_guid) {
        tracing::warn!(error = %e, "audit append failed");
    }
    to_json(&created)
}

#[derive(Deserialize)]
struct UpdateSourceArgs {
    source_id: Uuid,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    languages: Option<Vec<String>>,
    #[serde(default)]
    trust_level: Option<String>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, Value>>,
}

async fn update_source(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: UpdateSourceArgs = parse_args(body)?;
    let (group_name, _) = state.groups.resolve_write_group(tokens)?;
    let permitted = state.groups.resolve_permitted_group_ids(tokens);

    let update = SourceUpdate {
        name: args.name,
        source_type: args
            .source_type
            .as_deref()
            .map(|t| {
                SourceType::parse(t)
                    .ok_or_else(|| Error::validation(format!("unknown source_type: {t}")))
            })
            .transpose()?,
        region: args.region,
        languages: args.languages,
        trust_level: args
            .trust_level
            .as_deref()
            .map(|t| {
                TrustLevel::parse(t)
                    .ok_or_else(|| Error::validation(format!("unknown trust_level: {t}")))
            })
            .transpose()?,
        metadata: args.metadata,
    };

    let updated = state
        .registry
        .update(args.source_id, update, &[group_name], Some(&permitted))
        .await?;
    to_json(&updated)
}

async fn delete_source(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: SourceIdArgs = parse_args(body)?;
    let (group_name, _) = state.groups.resolve_write_group(tokens)?;
    let permitted = state.groups.resolve_permitted_group_ids(tokens);

    let deleted =
        state.registry.soft_delete(args.source_id, &[group_name.clone()], Some(&permitted)).await?;
    if let Err(e) = state.audit.log_source_delete(&[group_name], args.source_id) {
        tracing::warn!(error = %e, "audit append failed");
    }
    Ok(json!({
        "source": deleted,
        "active": false,
        "deleted_at": Utc::now(),
    }))
}

// ---- documents ----

#[derive(Deserialize)]
struct GetDocumentArgs {
    doc_id: Uuid,
    #[serde(default)]
    date_hint: Option<String>,
}

fn get_document(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: GetDocumentArgs = parse_args(body)?;
    let group_names = state.groups.resolve_permitted_groups(tokens);
    let permitted = GroupService::get_group_uuids_by_names(&group_names);

    let document =
        state.store.load_with_access_check(args.doc_id, &permitted, args.date_hint.as_deref())?;
    if let Err(e) = state.audit.log_document_retrieve(&group_names, args.doc_id) {
        tracing::warn!(error = %e, "audit append failed");
    }
    to_json(&document)
}

async fn delete_document(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    // Hard delete is an administrative operation.
    state.groups.require_admin(tokens)?;
    let args: GetDocumentArgs = parse_args(body)?;
    let group_names = state.groups.resolve_permitted_groups(tokens);
    let permitted = GroupService::get_group_uuids_by_names(&group_names);

    let document =
        state.store.load_with_access_check(args.doc_id, &permitted, args.date_hint.as_deref())?;
    state.store.delete(document.guid, document.group_guid)?;
    if let Err(e) = state.vector.delete_document(document.guid).await {
        tracing::warn!(error = %e, doc = %document.guid,
            "vector cleanup failed after hard delete; manual cleanup may be needed");
    }
    if let Err(e) =
        state.graph.delete_node(NodeLabel::Document, &document.guid.to_string()).await
    {
        tracing::warn!(error = %e, doc = %document.guid,
            "graph cleanup failed after hard delete; manual cleanup may be needed");
    }
    if let Err(e) = state.audit.log_document_delete(&group_names, document.guid) {
        tracing::warn!(error = %e, "audit append failed");
    }
    Ok(json!({"doc_id": document.guid, "deleted": true}))
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
    #[serde(default)]
    n_results: Option<usize>,
    #[serde(default)]
    enable_graph_expansion: Option<bool>,
    #[serde(default)]
    scoring_weights: Option<ScoringWeights>,
    #[serde(flatten)]
    filters: QueryFilters,
}

async fn query_documents(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: QueryArgs = parse_args(body)?;
    let group_names = state.groups.resolve_permitted_groups(tokens);
    let permitted = GroupService::get_group_uuids_by_names(&group_names);

    let response = state
        .query
        .query(
            &args.query,
            &permitted,
            args.n_results.unwrap_or(10).clamp(1, 100),
            &args.filters,
            &args.scoring_weights.unwrap_or_default(),
            args.enable_graph_expansion.unwrap_or(true),
            &group_names,
        )
        .await?;
    to_json(&response)
}

// ---- feeds ----

#[derive(Deserialize)]
struct FeedArgs {
    client_id: Uuid,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    time_window_hours: Option<i64>,
    #[serde(default)]
    opportunity_bias: Option<f64>,
}

async fn client_avatar_feed(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: FeedArgs = parse_args(body)?;
    require_client_access(state, tokens, args.client_id).await?;
    let feed = state
        .feed
        .get_client_avatar_feed(
            args.client_id,
            args.limit.unwrap_or(20).clamp(1, 100),
            args.time_window_hours.unwrap_or(24),
            args.opportunity_bias.unwrap_or(0.0),
        )
        .await?;
    to_json(&feed)
}

async fn top_client_news(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: FeedArgs = parse_args(body)?;
    require_client_access(state, tokens, args.client_id).await?;
    let articles = state
        .feed
        .get_top_client_news(
            args.client_id,
            args.limit.unwrap_or(10).clamp(1, 100),
            args.time_window_hours.unwrap_or(24),
            args.opportunity_bias.unwrap_or(0.0),
        )
        .await?;
    Ok(json!({"articles": articles}))
}

/// Clients are group-scoped like everything else.
async fn require_client_access(
    state: &AppState,
    tokens: &[String],
    client_guid: Uuid,
) -> Result<()> {
    let permitted = state.groups.resolve_permitted_group_ids(tokens);
    let context = state
        .graph
        .get_client_context(client_guid)
        .await?
        .ok_or_else(|| Error::validation(format!("client {client_guid} not found")))?;
    if !permitted.contains(&context.client.group_guid) {
        return Err(Error::AccessDenied(format!(
            "client {client_guid} belongs to another group"
        )));
    }
    Ok(())
}

// ---- clients ----

#[derive(Deserialize)]
struct CreateClientArgs {
    name: String,
    #[serde(default)]
    client_type_code: Option<String>,
    #[serde(default)]
    primary_contact: Option<String>,
    #[serde(default)]
    alert_frequency: Option<String>,
}

async fn create_client(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: CreateClientArgs = parse_args(body)?;
    let (_, group_guid) = state.groups.resolve_write_group(tokens)?;

    let client = gofriq::models::Client {
        client_guid: Uuid::new_v4(),
        name: args.name,
        client_type_code: args.client_type_code,
        group_guid,
        primary_contact: args.primary_contact,
        alert_frequency: args.alert_frequency,
    };
    state.clients.create_client(&client).await?;
    to_json(&client)
}

#[derive(Deserialize)]
struct PortfolioArgs {
    client_id: Uuid,
    ticker: String,
    weight: f64,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    shares: Option<f64>,
    #[serde(default)]
    avg_cost: Option<f64>,
}

async fn add_to_portfolio(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: PortfolioArgs = parse_args(body)?;
    state.groups.resolve_write_group(tokens)?;
    require_client_access(state, tokens, args.client_id).await?;
    state
        .clients
        .add_to_portfolio(
            args.client_id,
            &args.ticker,
            args.weight,
            args.sentiment.as_deref(),
            args.shares,
            args.avg_cost,
        )
        .await?;
    Ok(json!({"client_id": args.client_id, "ticker": args.ticker.to_uppercase(), "added": true}))
}

#[derive(Deserialize)]
struct WatchlistArgs {
    client_id: Uuid,
    ticker: String,
    #[serde(default)]
    alert_threshold: Option<f64>,
}

async fn add_to_watchlist(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: WatchlistArgs = parse_args(body)?;
    state.groups.resolve_write_group(tokens)?;
    require_client_access(state, tokens, args.client_id).await?;
    state.clients.add_to_watchlist(args.client_id, &args.ticker, args.alert_threshold).await?;
    Ok(json!({"client_id": args.client_id, "ticker": args.ticker.to_uppercase(), "added": true}))
}

#[derive(Deserialize)]
struct ClientIdArgs {
    client_id: Uuid,
}

async fn get_client_profile(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: ClientIdArgs = parse_args(body)?;
    require_client_access(state, tokens, args.client_id).await?;
    let profile = state.clients.get_client_profile(args.client_id).await?;
    let completeness = state.clients.calculate_profile_completeness(args.client_id).await?;
    Ok(json!({"profile": profile, "completeness": completeness}))
}

#[derive(Deserialize)]
struct UpdateProfileArgs {
    client_id: Uuid,
    #[serde(flatten)]
    profile: ClientProfile,
}

async fn update_client_profile(
    state: &AppState,
    tokens: &[String],
    body: &Value,
) -> Result<Value> {
    let args: UpdateProfileArgs = parse_args(body)?;
    state.groups.resolve_write_group(tokens)?;
    require_client_access(state, tokens, args.client_id).await?;
    state.clients.update_client_profile(args.client_id, &args.profile).await?;
    Ok(json!({"client_id": args.client_id, "updated": true}))
}

#[derive(Deserialize)]
struct ListClientsArgs {
    #[serde(default)]
    group_id: Option<Uuid>,
}

async fn list_clients(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: ListClientsArgs = parse_args(body)?;
    let permitted = state.groups.resolve_permitted_group_ids(tokens);
    if let Some(group) = args.group_id {
        if !permitted.contains(&group) {
            return Err(Error::AccessDenied(format!("group {group} is not permitted")));
        }
    }

    let clients: Vec<_> = state
        .clients
        .list_clients(args.group_id)
        .await?
        .into_iter()
        .filter(|c| permitted.contains(&c.group_guid))
        .collect();
    Ok(json!({"clients": clients, "count": clients.len()}))
}

// ---- graph exploration and market context ----

#[derive(Deserialize)]
struct ExploreArgs {
    node_type: String,
    node_id: String,
    #[serde(default)]
    relationship_types: Option<Vec<String>>,
    #[serde(default)]
    max_depth: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

/// Group-scope an exploration: the start node must be readable, and every
/// edge touching a Document outside the caller's groups is dropped before
/// serialization. Documents carry their group as a node property, so the
/// check needs no extra traversal for the start node.
async fn scope_explore_result(
    state: &AppState,
    permitted: &[Uuid],
    mut result: ExploreResult,
) -> Result<ExploreResult> {
    if result.start_node.label == NodeLabel::Document {
        let readable = result
            .start_node
            .properties
            .get("group_guid")
            .and_then(Value::as_str)
            .and_then(|g| g.parse::<Uuid>().ok())
            .map_or(false, |g| permitted.contains(&g));
        if !readable {
            return Err(Error::AccessDenied(format!(
                "document {} is outside the caller's groups",
                result.start_node.guid
            )));
        }
    }

    // Resolve each Document endpoint's group once.
    let mut doc_groups: HashMap<String, Option<Uuid>> = HashMap::new();
    for rel in &result.relationships {
        for (label, guid) in
            [(rel.from_label, &rel.from_guid), (rel.to_label, &rel.to_guid)]
        {
            if label == NodeLabel::Document && !doc_groups.contains_key(guid) {
                let group = match guid.parse::<Uuid>() {
                    Ok(doc_guid) => state
                        .graph
                        .get_document_record(doc_guid)
                        .await?
                        .and_then(|r| r.group_guid),
                    Err(_) => None,
                };
                doc_groups.insert(guid.clone(), group);
            }
        }
    }

    let before = result.relationships.len();
    result.relationships.retain(|rel| {
        [(rel.from_label, &rel.from_guid), (rel.to_label, &rel.to_guid)]
            .iter()
            .all(|(label, guid)| {
                *label != NodeLabel::Document
                    || doc_groups
                        .get(*guid)
                        .copied()
                        .flatten()
                        .map_or(false, |g| permitted.contains(&g))
            })
    });
    let dropped = before - result.relationships.len();
    result.total_found = result.total_found.saturating_sub(dropped);
    Ok(result)
}

async fn explore_graph(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: ExploreArgs = parse_args(body)?;
    let permitted = state.groups.resolve_permitted_group_ids(tokens);

    let label = NodeLabel::parse(&args.node_type)
        .ok_or_else(|| Error::validation(format!("unknown node_type: {}", args.node_type)))?;
    let relationship_types = args
        .relationship_types
        .map(|names| {
            names
                .iter()
                .map(|n| {
                    RelationType::parse(n)
                        .ok_or_else(|| Error::validation(format!("unknown relationship: {n}")))
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let result = state
        .graph
        .explore(
            label,
            &args.node_id,
            relationship_types.as_deref(),
            args.max_depth.unwrap_or(2).min(3),
            args.limit.unwrap_or(50).clamp(1, 500),
        )
        .await?;
    let result = scope_explore_result(state, &permitted, result).await?;
    to_json(&result)
}

#[derive(Deserialize)]
struct MarketContextArgs {
    ticker: String,
    #[serde(default = "default_true")]
    include_peers: bool,
    #[serde(default = "default_true")]
    include_events: bool,
    #[serde(default)]
    include_indices: bool,
    #[serde(default)]
    days_back: Option<i64>,
}

async fn market_context(state: &AppState, tokens: &[String], body: &Value) -> Result<Value> {
    let args: MarketContextArgs = parse_args(body)?;
    let permitted = state.groups.resolve_permitted_group_ids(tokens);

    let overview = state
        .graph
        .instrument_overview(&args.ticker)
        .await?
        .ok_or_else(|| Error::validation(format!("unknown instrument: {}", args.ticker)))?;

    let since = Utc::now() - Duration::days(args.days_back.unwrap_or(7).clamp(1, 365));
    let recent: Vec<_> = state
        .graph
        .get_documents_mentioning(&args.ticker, 50)
        .await?
        .into_iter()
        .filter(|d| d.created_at.map_or(false, |at| at >= since))
        .filter(|d| d.group_guid.map_or(false, |g| permitted.contains(&g)))
        .collect();

    let events: Vec<Value> = recent
        .iter()
        .filter_map(|d| {
            d.event_type.as_ref().map(|e| {
                json!({
                    "doc_id": d.guid,
                    "event_type": e,
                    "created_at": d.created_at,
                })
            })
        })
        .collect();

    let mut context = json!({
        "ticker": overview.ticker,
        "company_name": overview.company_name,
        "sector": overview.sector,
        "factor_exposures": overview.factor_exposures,
        "recent_documents": recent,
    });
    if args.include_peers {
        context["peers"] = json!(overview.peers);
        context["suppliers"] = json!(overview.suppliers);
        context["competitors"] = json!(overview.competitors);
    }
    if args.include_events {
        context["recent_events"] = json!(events);
    }
    if args.include_indices {
        // Index membership is not part of the seeded universe yet.
        context["indices"] = json!([]);
    }
    Ok(context)
}

// ---- health ----

async fn health_check(state: &AppState) -> Result<Value> {
    let report = state.health.check().await;
    Ok(json!({
        "status": report.status,
        "services": {
            "neo4j": report.neo4j,
            "chromadb": report.chromadb,
            "llm": report.llm,
        }
    }))
}
