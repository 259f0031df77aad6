//! In-memory provisioner.
//!
//! Records every registration in a [`ProvisionPlan`] instead of calling a
//! cloud API. Used by `plan` to print what a deployment would create and by
//! `serve` as the backing store of the local emulator.
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard},
};

use serde::Serialize;

use crate::{
    core::{
        cors::CorsPolicy,
        integrator::{IntegrationRecord, ResponseModel},
        validator::RequestValidatorSpec,
    },
    ports::provisioner::{
        InvokeGrant, LogGroupSpec, ModelSpec, ProvisionError, ProvisionResult, Provisioner,
        RemovalPolicy, TeardownReport, UsagePlanSpec,
    },
};

/// Everything provisioned so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProvisionPlan {
    pub resources: BTreeSet<String>,
    pub preflights: BTreeMap<String, CorsPolicy>,
    pub grants: BTreeSet<InvokeGrant>,
    pub models: BTreeMap<String, ModelSpec>,
    pub request_validators: BTreeSet<RequestValidatorSpec>,
    pub log_groups: BTreeMap<String, LogGroupSpec>,
    pub usage_plans: BTreeMap<String, UsagePlanSpec>,
    /// Keyed by `"{VERB} {path}"`
    pub methods: BTreeMap<String, IntegrationRecord>,
}

impl ProvisionPlan {
    pub fn method(&self, verb: &str, path: &str) -> Option<&IntegrationRecord> {
        self.methods.get(&method_key(verb, path))
    }
}

fn method_key(verb: &str, path: &str) -> String {
    format!("{verb} {path}")
}

#[derive(Debug, Default)]
pub struct PlanProvisioner {
    plan: Mutex<ProvisionPlan>,
}

impl PlanProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current plan.
    pub fn snapshot(&self) -> ProvisionResult<ProvisionPlan> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> ProvisionResult<MutexGuard<'_, ProvisionPlan>> {
        self.plan
            .lock()
            .map_err(|_| ProvisionError::Backend("provision plan lock poisoned".to_string()))
    }
}

/// Insert `value` under `key` unless an equal value is already there.
fn insert_once<V: PartialEq + Clone>(
    map: &mut BTreeMap<String, V>,
    key: &str,
    value: &V,
    kind: &str,
) -> ProvisionResult<bool> {
    match map.get(key) {
        Some(existing) if existing == value => Ok(false),
        Some(_) => Err(ProvisionError::Backend(format!(
            "{kind} '{key}' already exists with a different definition"
        ))),
        None => {
            map.insert(key.to_string(), value.clone());
            Ok(true)
        }
    }
}

impl Provisioner for PlanProvisioner {
    fn ensure_resource(&self, path: &str) -> ProvisionResult<bool> {
        Ok(self.lock()?.resources.insert(path.to_string()))
    }

    fn add_cors_preflight(&self, path: &str, policy: &CorsPolicy) -> ProvisionResult<bool> {
        let mut plan = self.lock()?;
        if !plan.resources.contains(path) {
            return Err(ProvisionError::MissingResource(path.to_string()));
        }
        insert_once(&mut plan.preflights, path, policy, "CORS preflight")
    }

    fn grant_invoke(&self, grant: &InvokeGrant) -> ProvisionResult<bool> {
        Ok(self.lock()?.grants.insert(grant.clone()))
    }

    fn register_model(&self, model: &ModelSpec) -> ProvisionResult<bool> {
        insert_once(&mut self.lock()?.models, &model.name, model, "Model")
    }

    fn register_request_validator(&self, spec: &RequestValidatorSpec) -> ProvisionResult<bool> {
        Ok(self.lock()?.request_validators.insert(spec.clone()))
    }

    fn register_log_group(&self, spec: &LogGroupSpec) -> ProvisionResult<bool> {
        insert_once(&mut self.lock()?.log_groups, &spec.name, spec, "Log group")
    }

    fn register_usage_plan(&self, spec: &UsagePlanSpec) -> ProvisionResult<bool> {
        insert_once(&mut self.lock()?.usage_plans, &spec.name, spec, "Usage plan")
    }

    fn add_method(&self, record: &IntegrationRecord) -> ProvisionResult<bool> {
        let mut plan = self.lock()?;
        if !plan.resources.contains(&record.path) {
            return Err(ProvisionError::MissingResource(record.path.clone()));
        }

        let referenced = record
            .model_id
            .iter()
            .chain(record.response_model_id.iter())
            .map(String::as_str)
            .chain(
                record
                    .method_responses
                    .iter()
                    .map(|r| &r.model)
                    .filter(|m| **m != ResponseModel::Empty)
                    .map(|m| m.name()),
            );
        for name in referenced {
            if !plan.models.contains_key(name) {
                return Err(ProvisionError::UnknownModel(name.to_string()));
            }
        }

        let key = method_key(record.verb.as_str(), &record.path);
        match plan.methods.get(&key) {
            Some(existing) if existing == record => Ok(false),
            Some(_) => Err(ProvisionError::MethodMismatch {
                path: record.path.clone(),
                verb: record.verb.to_string(),
            }),
            None => {
                plan.methods.insert(key, record.clone());
                Ok(true)
            }
        }
    }

    fn teardown(&self) -> ProvisionResult<TeardownReport> {
        let mut plan = self.lock()?;
        let mut report = TeardownReport::default();

        for key in plan.methods.keys() {
            report.destroyed.push(format!("method {key}"));
        }
        for path in plan.preflights.keys() {
            report.destroyed.push(format!("preflight {path}"));
        }
        for path in &plan.resources {
            report.destroyed.push(format!("resource {path}"));
        }
        for grant in &plan.grants {
            report
                .destroyed
                .push(format!("permission {} <- {}", grant.handler, grant.source_arn));
        }
        for name in plan.models.keys() {
            report.destroyed.push(format!("model {name}"));
        }
        for spec in &plan.request_validators {
            report.destroyed.push(format!("request validator {}", spec.name));
        }

        plan.log_groups.retain(|name, spec| {
            let entry = format!("log group {name}");
            match spec.removal_policy {
                RemovalPolicy::Retain => {
                    report.retained.push(entry);
                    true
                }
                RemovalPolicy::Destroy => {
                    report.destroyed.push(entry);
                    false
                }
            }
        });
        plan.usage_plans.retain(|name, spec| {
            let entry = format!("usage plan {name}");
            match spec.removal_policy {
                RemovalPolicy::Retain => {
                    report.retained.push(entry);
                    true
                }
                RemovalPolicy::Destroy => {
                    report.destroyed.push(entry);
                    false
                }
            }
        });

        plan.methods.clear();
        plan.preflights.clear();
        plan.resources.clear();
        plan.grants.clear();
        plan.models.clear();
        plan.request_validators.clear();

        Ok(report)
    }
}
