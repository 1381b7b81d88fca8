//! Item and ping controllers.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use keel::prelude::*;
use serde_json::{Value, json};

use crate::auth::BASIC_AUTH;
use crate::store::ItemStore;

fn store(app: &AppContext) -> Result<Arc<ItemStore>, BoxError> {
    app.state::<ItemStore>()
        .ok_or_else(|| "item store is not registered".into())
}

fn user_id(req: &Request) -> Option<String> {
    req.auth
        .as_ref()
        .and_then(|auth| auth.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `GET /items`
pub fn list() -> Controller {
    Controller::new(
        "Get list of items",
        handler_fn(|app, _, _| Ok(serde_json::to_value(store(app)?.list())?)),
    )
    .auth(AuthRequirement::new(BASIC_AUTH).mode("try"))
}

/// `GET /items/:id`
pub fn show() -> Controller {
    Controller::new(
        "Return item by id",
        handler_fn(|app, req, _| {
            let id = req.params["id"].as_u64().ok_or_else(|| AppError::status(404))?;
            let item = usize::try_from(id)
                .ok()
                .and_then(|id| store(app).ok()?.get(id))
                .ok_or_else(|| AppError::status(404))?;
            Ok(serde_json::to_value(item)?)
        }),
    )
    .auth(AuthRequirement::new(BASIC_AUTH).mode("try"))
    .validate(SectionSchemas::new().params(
        Schema::object().key("id", Schema::integer().min(0.0).required()),
    ))
}

/// `POST /items`
pub fn add() -> Controller {
    Controller::new(
        "Save item",
        handler_fn(|app, req, reply| {
            let title = req.body["title"].as_str().unwrap_or_default().to_string();
            let price = req.body["price"].as_u64().unwrap_or_default();
            let id = store(app)?.add(user_id(req), title, price);
            reply.set_status(201).header("location", format!("/items/{id}"));
            Ok(json!({ "id": id }))
        }),
    )
    .auth(
        AuthRequirement::new(BASIC_AUTH)
            .mode("required")
            .with("scope", json!(["user"])),
    )
    .validate_with(|_| {
        SectionSchemas::new().body(
            Schema::object()
                .key("title", Schema::string().required())
                .key("price", Schema::integer().positive().required()),
        )
    })
}

/// `ALL /ping`
pub fn ping() -> Controller {
    Controller::new(
        "Ping controller",
        handler_fn(|app, req, _| {
            Ok(json!({
                "method": req.method,
                "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "query": req.query,
                "user": user_id(req),
                "items": store(app)?.len(),
            }))
        }),
    )
    .auth(AuthRequirement::new(BASIC_AUTH).mode("try"))
    .validate(SectionSchemas::new().query(
        Schema::object()
            .key("x", Schema::number())
            .key("y", Schema::number())
            .allow_unknown(),
    ))
}

/// Every route of the service.
pub fn routes() -> Vec<RouteDef> {
    let mut routes = RouteDef::for_path("/items", [(Method::Get, list()), (Method::Post, add())]);
    routes.push(RouteDef::new(Method::Get, "/items/:id", show()));
    routes.push(RouteDef::new(Method::All, "/ping", ping()));
    routes
}
