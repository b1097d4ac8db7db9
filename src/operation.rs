//! Operations a facade can invoke, with their requests and responses

use crate::subscription::Subscription;

use std::collections::BTreeMap;
use std::fmt;

/// Every operation a connector facade exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Search,
    /// Single-object lookup by uid, served by `Search`
    Get,
    Schema,
    Authenticate,
    ResolveUsername,
    Test,
    /// Configuration validation, runs without pooling
    Validate,
    ScriptOnConnector,
    ScriptOnResource,
    Sync,
    EventSubscription,
    SyncSubscription,
}

impl OperationKind {
    pub const ALL: [OperationKind; 15] = [
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::Search,
        OperationKind::Get,
        OperationKind::Schema,
        OperationKind::Authenticate,
        OperationKind::ResolveUsername,
        OperationKind::Test,
        OperationKind::Validate,
        OperationKind::ScriptOnConnector,
        OperationKind::ScriptOnResource,
        OperationKind::Sync,
        OperationKind::EventSubscription,
        OperationKind::SyncSubscription,
    ];

    /// Long-lived operations that must not be bounded by a call deadline
    pub fn is_subscription(self) -> bool {
        matches!(self, Self::EventSubscription | Self::SyncSubscription)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Type of object a connector manages, e.g. `__ACCOUNT__`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectClass(String);

impl ObjectClass {
    pub const ACCOUNT: &'static str = "__ACCOUNT__";
    pub const GROUP: &'static str = "__GROUP__";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn account() -> Self {
        Self::new(Self::ACCOUNT)
    }

    pub fn group() -> Self {
        Self::new(Self::GROUP)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend identifier of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(String);

impl Uid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named, multi-valued attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, [value.into()])
    }
}

/// Object read from or written to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorObject {
    pub object_class: ObjectClass,
    pub uid: Uid,
    pub attributes: Vec<Attribute>,
}

impl ConnectorObject {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

/// Search filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Object with this uid
    Uid(Uid),
    /// Attribute `name` has `value` among its values
    Equals { name: String, value: String },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Evaluate against an object; handy for connectors without native filtering
    pub fn matches(&self, object: &ConnectorObject) -> bool {
        match self {
            Self::Uid(uid) => &object.uid == uid,
            Self::Equals { name, value } => object
                .attribute(name)
                .is_some_and(|a| a.values.iter().any(|v| v == value)),
            Self::And(left, right) => left.matches(object) && right.matches(object),
            Self::Or(left, right) => left.matches(object) || right.matches(object),
        }
    }
}

/// Secret that never shows up in debug output
#[derive(Clone, PartialEq, Eq)]
pub struct GuardedString(String);

impl GuardedString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GuardedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GuardedString(***)")
    }
}

/// Object classes and their attribute names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub object_classes: BTreeMap<ObjectClass, Vec<String>>,
}

impl Schema {
    pub fn with_object_class<I, S>(mut self, object_class: ObjectClass, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_classes
            .insert(object_class, attributes.into_iter().map(Into::into).collect());
        self
    }
}

/// Script to run on the connector or on the backend resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptContext {
    pub language: String,
    pub text: String,
    pub arguments: BTreeMap<String, String>,
}

impl ScriptContext {
    pub fn new(language: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            text: text.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

/// Position in a backend change log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncToken(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDeltaKind {
    CreateOrUpdate,
    Delete,
}

/// One change reported by `Sync`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDelta {
    pub token: SyncToken,
    pub kind: SyncDeltaKind,
    pub uid: Uid,
    pub object: Option<ConnectorObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub deltas: Vec<SyncDelta>,
    /// Token to resume from
    pub token: Option<SyncToken>,
}

/// What a subscription listens to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionTopic {
    /// Objects matching the filter as they change
    Events { filter: Option<Filter> },
    /// Change-log deltas from the given token on
    Sync { token: Option<SyncToken> },
}

/// Item delivered to a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Object(ConnectorObject),
    Delta(SyncDelta),
}

/// Arguments of one operation call
#[derive(Debug, Clone)]
pub enum OperationRequest {
    Create {
        object_class: ObjectClass,
        attributes: Vec<Attribute>,
    },
    Update {
        object_class: ObjectClass,
        uid: Uid,
        attributes: Vec<Attribute>,
    },
    Delete {
        object_class: ObjectClass,
        uid: Uid,
    },
    Search {
        object_class: ObjectClass,
        filter: Option<Filter>,
    },
    Get {
        object_class: ObjectClass,
        uid: Uid,
    },
    Schema,
    Authenticate {
        object_class: ObjectClass,
        username: String,
        password: GuardedString,
    },
    ResolveUsername {
        object_class: ObjectClass,
        username: String,
    },
    Test,
    Validate,
    ScriptOnConnector(ScriptContext),
    ScriptOnResource(ScriptContext),
    Sync {
        object_class: ObjectClass,
        token: Option<SyncToken>,
    },
    EventSubscription {
        object_class: ObjectClass,
        filter: Option<Filter>,
    },
    SyncSubscription {
        object_class: ObjectClass,
        token: Option<SyncToken>,
    },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
            Self::Search { .. } => OperationKind::Search,
            Self::Get { .. } => OperationKind::Get,
            Self::Schema => OperationKind::Schema,
            Self::Authenticate { .. } => OperationKind::Authenticate,
            Self::ResolveUsername { .. } => OperationKind::ResolveUsername,
            Self::Test => OperationKind::Test,
            Self::Validate => OperationKind::Validate,
            Self::ScriptOnConnector(_) => OperationKind::ScriptOnConnector,
            Self::ScriptOnResource(_) => OperationKind::ScriptOnResource,
            Self::Sync { .. } => OperationKind::Sync,
            Self::EventSubscription { .. } => OperationKind::EventSubscription,
            Self::SyncSubscription { .. } => OperationKind::SyncSubscription,
        }
    }
}

/// Result of one operation call
#[derive(Debug)]
pub enum OperationResponse {
    /// Nothing to report (delete, test, validate)
    Empty,
    Uid(Uid),
    Objects(Vec<ConnectorObject>),
    Object(Option<ConnectorObject>),
    Schema(Schema),
    ScriptResult(String),
    Sync(SyncResult),
    Subscription(Subscription),
}

impl OperationResponse {
    pub fn into_uid(self) -> Option<Uid> {
        match self {
            Self::Uid(uid) => Some(uid),
            _ => None,
        }
    }

    pub fn into_objects(self) -> Option<Vec<ConnectorObject>> {
        match self {
            Self::Objects(objects) => Some(objects),
            _ => None,
        }
    }

    /// The single object of a `Get`; `None` both for "not found" and for
    /// other response kinds
    pub fn into_object(self) -> Option<ConnectorObject> {
        match self {
            Self::Object(object) => object,
            _ => None,
        }
    }

    pub fn into_schema(self) -> Option<Schema> {
        match self {
            Self::Schema(schema) => Some(schema),
            _ => None,
        }
    }

    pub fn into_script_result(self) -> Option<String> {
        match self {
            Self::ScriptResult(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_sync(self) -> Option<SyncResult> {
        match self {
            Self::Sync(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_subscription(self) -> Option<Subscription> {
        match self {
            Self::Subscription(subscription) => Some(subscription),
            _ => None,
        }
    }
}
