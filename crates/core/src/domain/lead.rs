use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub Uuid);

impl LeadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Nurture,
    Quoted,
    Converted,
    Lost,
    Spam,
}

/// Every field the extractor may report. Declaration order is the reporting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Name,
    Email,
    Company,
    Role,
    Industry,
    ProblemText,
    AutomationArea,
    ToolsUsed,
    BudgetRange,
    Timeline,
    Urgency,
    InterestLevel,
}

impl LeadField {
    pub const ALL: [LeadField; 12] = [
        Self::Name,
        Self::Email,
        Self::Company,
        Self::Role,
        Self::Industry,
        Self::ProblemText,
        Self::AutomationArea,
        Self::ToolsUsed,
        Self::BudgetRange,
        Self::Timeline,
        Self::Urgency,
        Self::InterestLevel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Company => "company",
            Self::Role => "role",
            Self::Industry => "industry",
            Self::ProblemText => "problem_text",
            Self::AutomationArea => "automation_area",
            Self::ToolsUsed => "tools_used",
            Self::BudgetRange => "budget_range",
            Self::Timeline => "timeline",
            Self::Urgency => "urgency",
            Self::InterestLevel => "interest_level",
        }
    }
}

impl std::fmt::Display for LeadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured data the model claims to have pulled out of a transcript.
///
/// Nothing in here is trustworthy until it has been checked against the
/// conversation that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedLeadFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
    pub industry: Option<String>,
    pub problem_text: Option<String>,
    pub automation_area: Option<String>,
    pub tools_used: Option<Vec<String>>,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
    pub urgency: Option<String>,
    #[serde(deserialize_with = "lenient_interest_level")]
    pub interest_level: Option<i64>,
}

/// Models report the 1-10 score as `7`, `7.5` or `"7"`. All of them are
/// accepted and rounded; text that is not a number reads as absent.
fn lenient_interest_level<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Reported {
        Integer(i64),
        Float(f64),
        Text(String),
    }

    let reported = Option::<Reported>::deserialize(deserializer)?;
    Ok(match reported {
        None => None,
        Some(Reported::Integer(level)) => Some(level),
        Some(Reported::Float(level)) => rounded(level),
        Some(Reported::Text(text)) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| text.parse::<f64>().ok().and_then(rounded))
        }
    })
}

fn rounded(level: f64) -> Option<i64> {
    // `as` saturates; out-of-range scores are left for the range check.
    level.is_finite().then(|| level.round() as i64)
}

impl ExtractedLeadFields {
    /// Single-valued text fields; `tools_used` and `interest_level` are not text.
    pub fn text(&self, field: LeadField) -> Option<&str> {
        let value = match field {
            LeadField::Name => &self.name,
            LeadField::Email => &self.email,
            LeadField::Company => &self.company,
            LeadField::Role => &self.role,
            LeadField::Industry => &self.industry,
            LeadField::ProblemText => &self.problem_text,
            LeadField::AutomationArea => &self.automation_area,
            LeadField::BudgetRange => &self.budget_range,
            LeadField::Timeline => &self.timeline,
            LeadField::Urgency => &self.urgency,
            LeadField::ToolsUsed | LeadField::InterestLevel => return None,
        };
        value.as_deref()
    }

    pub fn is_present(&self, field: LeadField) -> bool {
        match field {
            LeadField::ToolsUsed => self.tools_used.as_ref().is_some_and(|tools| !tools.is_empty()),
            LeadField::InterestLevel => self.interest_level.is_some(),
            other => self.text(other).is_some_and(|value| !value.trim().is_empty()),
        }
    }

    pub fn present_fields(&self) -> Vec<LeadField> {
        LeadField::ALL.into_iter().filter(|field| self.is_present(*field)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }

    pub fn clear(&mut self, field: LeadField) {
        match field {
            LeadField::Name => self.name = None,
            LeadField::Email => self.email = None,
            LeadField::Company => self.company = None,
            LeadField::Role => self.role = None,
            LeadField::Industry => self.industry = None,
            LeadField::ProblemText => self.problem_text = None,
            LeadField::AutomationArea => self.automation_area = None,
            LeadField::ToolsUsed => self.tools_used = None,
            LeadField::BudgetRange => self.budget_range = None,
            LeadField::Timeline => self.timeline = None,
            LeadField::Urgency => self.urgency = None,
            LeadField::InterestLevel => self.interest_level = None,
        }
    }

    /// Copy with every listed field nulled out.
    pub fn without(&self, fields: &BTreeSet<LeadField>) -> Self {
        let mut stripped = self.clone();
        for field in fields {
            stripped.clear(*field);
        }
        stripped
    }

    /// Overlays every populated field of `update` onto `self`. Blank strings
    /// and empty tool lists count as unpopulated and never erase a stored value.
    pub fn merge(&mut self, update: ExtractedLeadFields) {
        fn overlay_text(target: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
                *target = Some(value);
            }
        }

        overlay_text(&mut self.name, update.name);
        overlay_text(&mut self.email, update.email);
        overlay_text(&mut self.company, update.company);
        overlay_text(&mut self.role, update.role);
        overlay_text(&mut self.industry, update.industry);
        overlay_text(&mut self.problem_text, update.problem_text);
        overlay_text(&mut self.automation_area, update.automation_area);
        overlay_text(&mut self.budget_range, update.budget_range);
        overlay_text(&mut self.timeline, update.timeline);
        overlay_text(&mut self.urgency, update.urgency);

        let tools: Vec<String> = update
            .tools_used
            .unwrap_or_default()
            .into_iter()
            .filter(|tool| !tool.trim().is_empty())
            .collect();
        if !tools.is_empty() {
            self.tools_used = Some(tools);
        }
        if update.interest_level.is_some() {
            self.interest_level = update.interest_level;
        }
    }

    pub fn has_contact_details(&self) -> bool {
        [LeadField::Name, LeadField::Email, LeadField::Company]
            .into_iter()
            .all(|field| self.is_present(field))
    }

    pub fn has_project_description(&self) -> bool {
        self.is_present(LeadField::ProblemText) || self.is_present(LeadField::AutomationArea)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub fields: ExtractedLeadFields,
    pub status: LeadStatus,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: LeadId::new(),
            fields: ExtractedLeadFields::default(),
            status: LeadStatus::New,
            source: source.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Leads that have contact details and a project description are handed to automation.
    pub fn is_automation_ready(&self) -> bool {
        self.fields.has_contact_details() && self.fields.has_project_description()
    }

    pub fn can_transition_to(&self, next: LeadStatus) -> bool {
        matches!(
            (self.status, next),
            (LeadStatus::New, LeadStatus::Contacted)
                | (LeadStatus::New, LeadStatus::Qualified)
                | (LeadStatus::Contacted, LeadStatus::Qualified)
                | (LeadStatus::Contacted, LeadStatus::Nurture)
                | (LeadStatus::Nurture, LeadStatus::Qualified)
                | (LeadStatus::Qualified, LeadStatus::Quoted)
                | (LeadStatus::Quoted, LeadStatus::Converted)
                | (_, LeadStatus::Lost)
                | (_, LeadStatus::Spam)
        )
    }

    pub fn transition_to(&mut self, next: LeadStatus) -> Result<(), DomainError> {
        if self.status == next {
            return Ok(());
        }
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            return Ok(());
        }

        Err(DomainError::InvalidLeadTransition {
            lead_id: self.id.clone(),
            from: self.status,
            to: next,
        })
    }
}
