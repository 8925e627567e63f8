//! RPC Method Table
//!
//! Maps method names to handlers. Every method is registered explicitly at
//! startup with a flag saying whether the session must be authenticated.

use std::collections::HashMap;
use std::sync::Arc;

use hub_bus::{Message, MessageBus};
use hub_types::{Value, ValueMap};
use tracing::{debug, warn};

use super::object::ServerObject;
use super::protocol::{Arguments, RpcError, RpcResult, ServerFrame};
use super::session::{RemoteSubscriber, Session};
use crate::registry::{ObjectTable, RegistryError};

/// What handlers can reach
pub struct RpcContext {
    pub bus: Arc<MessageBus>,
    pub registry: Arc<ObjectTable>,
    pub server: Arc<ServerObject>,
}

type Handler =
    Box<dyn Fn(&RpcContext, &Arc<Session>, Arguments<'_>) -> RpcResult<Value> + Send + Sync>;

struct Method {
    requires_auth: bool,
    handler: Handler,
}

pub struct MethodTable {
    context: RpcContext,
    methods: HashMap<String, Method>,
}

impl MethodTable {
    /// Empty table
    pub fn new(context: RpcContext) -> Self {
        Self {
            context,
            methods: HashMap::new(),
        }
    }

    /// Table with the built-in methods registered
    pub fn with_core_methods(context: RpcContext) -> Self {
        let mut table = Self::new(context);
        table.register("authenticate", false, authenticate);
        table.register("getState", false, get_state);
        table.register("getConfiguration", false, get_configuration);
        table.register("setConfiguration", true, set_configuration);
        table.register("subscribe", true, subscribe);
        table.register("unsubscribe", true, unsubscribe);
        table.register("publish", true, publish);
        table
    }

    /// Add a method. The first registration of a name wins.
    pub fn register<F>(&mut self, name: impl Into<String>, requires_auth: bool, handler: F) -> bool
    where
        F: Fn(&RpcContext, &Arc<Session>, Arguments<'_>) -> RpcResult<Value>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        if self.methods.contains_key(&name) {
            warn!(method = %name, "An RPC method with this name is already registered");
            return false;
        }
        debug!(method = %name, requires_auth, "Registered RPC method");
        self.methods.insert(
            name,
            Method {
                requires_auth,
                handler: Box::new(handler),
            },
        );
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Run one call and build its response frame
    pub fn dispatch(&self, session: &Arc<Session>, call: &Value) -> ServerFrame {
        let sequence = call.get("sequence").cloned();
        match self.invoke(session, call) {
            Ok(result) => ServerFrame::success(sequence, result),
            Err(e) => {
                debug!(session = %session.id(), error = %e, "RPC call failed");
                ServerFrame::failure(sequence, &e)
            }
        }
    }

    /// Parse a JSON text frame and dispatch it
    pub fn dispatch_json(&self, session: &Arc<Session>, text: &str) -> ServerFrame {
        match serde_json::from_str::<Value>(text) {
            Ok(call) => self.dispatch(session, &call),
            Err(e) => ServerFrame::failure(None, &RpcError::from(e)),
        }
    }

    /// Drop everything a departing session left on the bus
    pub fn close_session(&self, session: &Session) {
        self.context.bus.unsubscribe_all(session.id());
        debug!(session = %session.id(), "Session closed");
    }

    fn invoke(&self, session: &Arc<Session>, call: &Value) -> RpcResult<Value> {
        let name = call
            .get("method")
            .filter(|method| !method.is_null())
            .map(Value::to_text)
            .ok_or(RpcError::MissingMethod)?;

        let empty = ValueMap::new();
        let arguments = match call.get("arguments") {
            None | Some(Value::Null) => &empty,
            Some(Value::Map(arguments)) => arguments,
            Some(_) => return Err(RpcError::InvalidArguments),
        };

        let method = self.methods.get(&name).ok_or(RpcError::NotImplemented)?;
        if method.requires_auth && !session.is_authenticated() {
            return Err(RpcError::AuthenticationRequired);
        }
        (method.handler)(&self.context, session, Arguments::new(arguments))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Core Methods
// ─────────────────────────────────────────────────────────────────────────────

fn authenticate(ctx: &RpcContext, session: &Arc<Session>, args: Arguments<'_>) -> RpcResult<Value> {
    let password = args.str("password").unwrap_or_default();
    let accepted = ctx.server.check_password(password);
    session.set_authenticated(accepted);
    if !accepted {
        warn!(session = %session.id(), "Authentication failed");
    }
    Ok(Value::Bool(accepted))
}

fn get_state(ctx: &RpcContext, _session: &Arc<Session>, _args: Arguments<'_>) -> RpcResult<Value> {
    Ok(ctx.registry.pack())
}

fn get_configuration(
    ctx: &RpcContext,
    _session: &Arc<Session>,
    args: Arguments<'_>,
) -> RpcResult<Value> {
    let uuid = args.uuid("uuid")?;
    if ctx.registry.get_instance(uuid).is_none() {
        return Err(RegistryError::NotFound(uuid).into());
    }
    let description = ctx
        .registry
        .get_configuration_description(uuid)
        .ok_or(RegistryError::NotConfigurable(uuid))?;
    let values = ctx.registry.get_configuration(uuid)?;
    Ok(Value::map_from_pairs([
        ("description", description.pack()),
        ("values", Value::Map(values)),
    ]))
}

fn set_configuration(
    ctx: &RpcContext,
    _session: &Arc<Session>,
    args: Arguments<'_>,
) -> RpcResult<Value> {
    let uuid = args.uuid("uuid")?;
    let values = args.map("values")?;
    Ok(Value::Map(ctx.registry.set_configuration(uuid, values)?))
}

fn subscribe(ctx: &RpcContext, session: &Arc<Session>, args: Arguments<'_>) -> RpcResult<Value> {
    let topic = ctx.bus.create(args.str("topic")?)?;
    ctx.bus
        .subscribe(&topic, RemoteSubscriber::new(Arc::clone(session)))?;
    Ok(Value::Bool(true))
}

fn unsubscribe(ctx: &RpcContext, session: &Arc<Session>, args: Arguments<'_>) -> RpcResult<Value> {
    let topic = ctx.bus.create(args.str("topic")?)?;
    ctx.bus.unsubscribe(&topic, session.id());
    Ok(Value::Bool(true))
}

fn publish(ctx: &RpcContext, session: &Arc<Session>, args: Arguments<'_>) -> RpcResult<Value> {
    let topic = ctx.bus.create(args.str("topic")?)?;
    let mut builder = Message::builder();
    for (name, value) in args.map("message")? {
        builder.add(name.clone(), value.clone());
    }
    builder.source(session.id());
    if let Some(target) = args.optional_uuid("target")? {
        builder.target(target);
    }
    ctx.bus
        .publish(&topic, builder.create_message(), Some(session.id()))?;
    Ok(Value::Bool(true))
}
