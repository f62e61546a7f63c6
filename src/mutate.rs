use crate::{typings::Request, Configuration, Error, Result};
use serde_json::{Map, Value};

pub const ALLOW_HTTP_ANNOTATION: &str = "kubernetes.io/ingress.allow-http";
pub const HARDWARE_TIER_LABEL: &str = "dominodatalab.com/hardware-tier-id";

/// A single mutation applied to objects of some kinds in some namespaces.
///
/// `apply` receives the request's private copy of the object and must be
/// idempotent: running it on an already mutated object changes nothing.
pub trait MutationRule: Send + Sync {
    fn name(&self) -> &str;

    fn matches(&self, kind: &str, namespace: &str) -> bool;

    fn apply(&self, object: &mut Value) -> Result<()>;
}

/// Forces HTTPS on Ingresses: disables plain HTTP through the
/// `allow-http` annotation and adds a `spec.tls` entry for the configured
/// host unless the object already declares its own.
pub struct IngressTls {
    namespace: String,
    hosts: [String; 2],
    secret_name: String,
}

impl IngressTls {
    pub fn new(config: &Configuration) -> Self {
        IngressTls {
            namespace: config.target_namespace.clone(),
            hosts: [config.tls_host.clone(), config.wildcard_host()],
            secret_name: config.tls_secret.to_string(),
        }
    }
}

impl MutationRule for IngressTls {
    fn name(&self) -> &str {
        "ingress-tls"
    }

    fn matches(&self, kind: &str, namespace: &str) -> bool {
        kind == "Ingress" && namespace == self.namespace
    }

    fn apply(&self, object: &mut Value) -> Result<()> {
        {
            let metadata = object_field(object, "metadata")?;
            let annotations = metadata.entry("annotations").or_insert(Value::Null);
            if annotations.is_null() {
                *annotations = Value::Object(Map::new());
            }
            let annotations = annotations
                .as_object_mut()
                .ok_or_else(|| Error::malformed(".metadata.annotations is not an object"))?;
            if !annotations.contains_key(ALLOW_HTTP_ANNOTATION) {
                annotations.insert(
                    ALLOW_HTTP_ANNOTATION.to_string(),
                    Value::String("false".to_string()),
                );
            }
        }

        let spec = object_field(object, "spec")?;
        if !spec.contains_key("tls") {
            spec.insert(
                "tls".to_string(),
                serde_json::json!([{
                    "hosts": self.hosts,
                    "secretName": self.secret_name,
                }]),
            );
        }
        Ok(())
    }
}

fn object_field<'a>(object: &'a mut Value, key: &str) -> Result<&'a mut Map<String, Value>> {
    object
        .get_mut(key)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::malformed(format!(".{} missing or not an object", key)))
}

/// Applies every matching rule to a deep copy of the admitted object.
pub struct Mutator {
    rules: Vec<Box<dyn MutationRule>>,
}

impl Mutator {
    pub fn new(config: &Configuration) -> Self {
        Mutator::with_rules(vec![Box::new(IngressTls::new(config))])
    }

    pub fn with_rules(rules: Vec<Box<dyn MutationRule>>) -> Self {
        Mutator { rules }
    }

    /// Returns the mutated copy. `request.object` itself is never touched.
    pub fn mutate(&self, request: &Request) -> Result<Value> {
        let mut object = request.object.clone();
        object_field(&mut object, "metadata")?;

        let kind = request.kind.kind.as_str();
        let namespace = request.namespace();
        for rule in &self.rules {
            if !rule.matches(kind, namespace) {
                continue;
            }
            tracing::debug!(
                rule = rule.name(),
                uid = request.uid.as_str(),
                "applying mutation rule"
            );
            rule.apply(&mut object)?;
        }
        Ok(object)
    }
}

pub fn mutate(request: &Request, config: &Configuration) -> Result<Value> {
    Mutator::new(config).mutate(request)
}

/// Value of the hardware tier label, if the object carries one.
pub fn hardware_tier(object: &Value) -> Option<&str> {
    object
        .get("metadata")?
        .get("labels")?
        .get(HARDWARE_TIER_LABEL)?
        .as_str()
}
