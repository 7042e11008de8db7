use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use tracing::{debug, instrument, warn};

use shared_config::AppConfig;
use shared_database::ClinicalStore;
use shared_models::{CareTeamMember, CareTeamRole};

use crate::error::CareTeamError;
use crate::models::{AlertContext, RecipientPolicy};

/// On-call members are always available; everyone else only on their listed
/// days within `[start, end)`.
pub fn is_available(member: &CareTeamMember, day: Weekday, hour: u32) -> bool {
    if member.on_call {
        return true;
    }
    let hours = &member.available_hours;
    hours.days.contains(&day) && hour >= hours.start && hour < hours.end
}

/// Picks which care-team members hear about an alert.
pub struct CareTeamRouter {
    store: Arc<dyn ClinicalStore>,
    timezone: Tz,
    business_start: u32,
    business_end: u32,
}

impl std::fmt::Debug for CareTeamRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CareTeamRouter")
            .field("timezone", &self.timezone)
            .field("business_start", &self.business_start)
            .field("business_end", &self.business_end)
            .finish_non_exhaustive()
    }
}

impl CareTeamRouter {
    pub fn new(store: Arc<dyn ClinicalStore>, timezone: Tz, business_start: u32, business_end: u32) -> Self {
        Self {
            store,
            timezone,
            business_start,
            business_end,
        }
    }

    pub fn from_config(store: Arc<dyn ClinicalStore>, config: &AppConfig) -> Result<Self, CareTeamError> {
        let timezone: Tz = config
            .clinic_timezone
            .parse()
            .map_err(|_| CareTeamError::InvalidTimezone(config.clinic_timezone.clone()))?;

        Ok(Self::new(
            store,
            timezone,
            config.business_hours_start,
            config.business_hours_end,
        ))
    }

    fn local_day_hour(&self, at: DateTime<Utc>) -> (Weekday, u32) {
        let local = at.with_timezone(&self.timezone);
        (local.weekday(), local.hour())
    }

    /// Monday to Friday within the configured clinic hours, clinic local time.
    pub fn is_business_hours(&self, at: DateTime<Utc>) -> bool {
        let (day, hour) = self.local_day_hour(at);
        !matches!(day, Weekday::Sat | Weekday::Sun) && hour >= self.business_start && hour < self.business_end
    }

    #[instrument(skip(self, context), fields(alert_type = %context.alert_type))]
    pub async fn recipients_for(
        &self,
        patient_id: &str,
        context: &AlertContext,
    ) -> Result<Vec<CareTeamMember>, CareTeamError> {
        let team = self.store.care_team(patient_id).await?;
        let recipients = self.select(&team, context);

        if recipients.is_empty() {
            warn!(patient_id = %patient_id, "No care-team recipients selected");
        } else {
            debug!(patient_id = %patient_id, count = recipients.len(), "Selected care-team recipients");
        }
        Ok(recipients)
    }

    /// Applies the alert type's policy to an already loaded team. Result is
    /// deduplicated by member id, first occurrence kept.
    pub fn select(&self, team: &[CareTeamMember], context: &AlertContext) -> Vec<CareTeamMember> {
        let in_hours = self.is_business_hours(context.occurred_at);
        let (day, hour) = self.local_day_hour(context.occurred_at);

        let selected: Vec<&CareTeamMember> = match context.alert_type.policy() {
            RecipientPolicy::PhysicianAndCoordinatorInHoursElseOnCall => {
                if in_hours {
                    chain(with_role(team, CareTeamRole::PrimaryPhysician), with_role(team, CareTeamRole::CareCoordinator))
                } else {
                    on_call(team)
                }
            }
            RecipientPolicy::CoordinatorIfAvailable => with_role(team, CareTeamRole::CareCoordinator)
                .into_iter()
                .filter(|member| is_available(member, day, hour))
                .collect(),
            RecipientPolicy::PhysicianAndCoordinator => {
                chain(with_role(team, CareTeamRole::PrimaryPhysician), with_role(team, CareTeamRole::CareCoordinator))
            }
            RecipientPolicy::OnCallPlusPhysicianInHours => {
                if in_hours {
                    chain(on_call(team), with_role(team, CareTeamRole::PrimaryPhysician))
                } else {
                    on_call(team)
                }
            }
            RecipientPolicy::CoordinatorOnly => with_role(team, CareTeamRole::CareCoordinator),
        };

        let mut seen = HashSet::new();
        selected
            .into_iter()
            .filter(|member| seen.insert(member.id.clone()))
            .cloned()
            .collect()
    }

    /// First escalation target: the on-call provider with the lowest escalation order.
    pub async fn on_call_provider(&self, patient_id: &str) -> Result<Option<CareTeamMember>, CareTeamError> {
        let team = self.store.care_team(patient_id).await?;
        Ok(on_call(&team).into_iter().next().cloned())
    }
}

fn with_role(team: &[CareTeamMember], role: CareTeamRole) -> Vec<&CareTeamMember> {
    let mut members: Vec<&CareTeamMember> = team.iter().filter(|m| m.role == role).collect();
    members.sort_by_key(|m| m.priority);
    members
}

fn on_call(team: &[CareTeamMember]) -> Vec<&CareTeamMember> {
    let mut members: Vec<&CareTeamMember> = team
        .iter()
        .filter(|m| m.role == CareTeamRole::OnCallProvider || m.on_call)
        .collect();
    members.sort_by_key(|m| (m.escalation_order, m.priority));
    members
}

fn chain<'a>(mut first: Vec<&'a CareTeamMember>, second: Vec<&'a CareTeamMember>) -> Vec<&'a CareTeamMember> {
    first.extend(second);
    first
}
