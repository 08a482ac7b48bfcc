use crate::constants::{
    BILLING_EVENT, GRAPH_TIME_FORMAT, INITIAL_STATUS, MINOR_UNITS_PER_MAJOR,
    SPECIAL_AD_CATEGORY_NONE,
};
use crate::facebook::{FacebookApiError, GraphApi, Params};
use crate::models::{
    Ad, AdAccountRef, AdSet, Campaign, Creative, Objective, Targeting, ValidationError,
};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Position in the creation chain where a remote call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Campaign,
    AdSet,
    Creative,
    Ad,
}

impl Stage {
    fn describe(&self) -> &'static str {
        match self {
            Stage::Campaign => "campaign",
            Stage::AdSet => "ad set",
            Stage::Creative => "ad creative",
            Stage::Ad => "ad",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Campaign => "campaign",
            Stage::AdSet => "adset",
            Stage::Creative => "creative",
            Stage::Ad => "ad",
        })
    }
}

/// Ids confirmed by the remote side before a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialProgress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creative_id: Option<String>,
}

impl PartialProgress {
    pub fn is_empty(&self) -> bool {
        self.campaign_id.is_none() && self.adset_id.is_none() && self.creative_id.is_none()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CampaignError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to create {}: {}", .stage.describe(), .source)]
    Remote {
        stage: Stage,
        created: PartialProgress,
        #[source]
        source: FacebookApiError,
    },
}

impl CampaignError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            CampaignError::Validation(_) => None,
            CampaignError::Remote { stage, .. } => Some(*stage),
        }
    }

    pub fn created(&self) -> Option<&PartialProgress> {
        match self {
            CampaignError::Validation(_) => None,
            CampaignError::Remote { created, .. } => Some(created),
        }
    }

    pub fn remote(&self) -> Option<&FacebookApiError> {
        match self {
            CampaignError::Validation(_) => None,
            CampaignError::Remote { source, .. } => Some(source),
        }
    }

    /// A remote failure after at least one entity was created.
    pub fn is_partial(&self) -> bool {
        self.created().is_some_and(|c| !c.is_empty())
    }
}

/// Caller input for one campaign chain.
#[derive(Debug, Clone)]
pub struct CampaignRequest {
    pub account: AdAccountRef,
    pub name: String,
    pub objective: Objective,
    pub custom_audience_id: String,
    /// Daily budget in account currency units, e.g. `25.0`.
    pub daily_budget: f64,
    pub page_id: String,
    pub ad_link: String,
    pub ad_message: String,
    /// Falls back to the campaign name.
    pub ad_title: Option<String>,
    pub bid_amount: Option<f64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Extra ad set targeting keys. Never overrides the custom audience.
    pub targeting: Option<Map<String, Value>>,
}

/// Everything in the chain once all four creations succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignChain {
    pub campaign: Campaign,
    pub ad_set: AdSet,
    pub creative: Creative,
    pub ad: Ad,
}

/// Converts currency units to the integer minor units the API expects,
/// rounding to the nearest unit.
pub fn to_minor_units(amount: f64, field: &'static str) -> Result<i64, ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::InvalidAmount { field, value: amount });
    }
    let minor = (amount * MINOR_UNITS_PER_MAJOR).round();
    if minor < 1.0 || minor > i64::MAX as f64 {
        return Err(ValidationError::InvalidAmount { field, value: amount });
    }
    Ok(minor as i64)
}

fn parse_time(raw: &str, field: &'static str) -> Result<DateTime<FixedOffset>, ValidationError> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, GRAPH_TIME_FORMAT))
        .map_err(|e| ValidationError::InvalidField {
            field,
            reason: format!("{raw}: {e}"),
        })
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(value.to_string())
}

/// Validated, converted form of a request. Built before any remote call.
#[derive(Debug, Clone)]
struct Plan {
    account: AdAccountRef,
    name: String,
    objective: Objective,
    custom_audience_id: String,
    daily_budget: i64,
    bid_amount: Option<i64>,
    start_time: Option<DateTime<FixedOffset>>,
    end_time: Option<DateTime<FixedOffset>>,
    targeting: Map<String, Value>,
    page_id: String,
    link: String,
    message: String,
    title: String,
}

impl CampaignRequest {
    fn plan(self) -> Result<Plan, ValidationError> {
        let name = required(&self.name, "name")?;
        let custom_audience_id = required(&self.custom_audience_id, "custom_audience_id")?;
        let page_id = required(&self.page_id, "page_id")?;
        let message = required(&self.ad_message, "ad_message")?;

        let link = required(&self.ad_link, "ad_link")?;
        let parsed = Url::parse(&link).map_err(|e| ValidationError::InvalidField {
            field: "ad_link",
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidField {
                field: "ad_link",
                reason: format!("unsupported scheme: {}", parsed.scheme()),
            });
        }

        let daily_budget = to_minor_units(self.daily_budget, "daily_budget")?;
        let bid_amount = self
            .bid_amount
            .map(|amount| to_minor_units(amount, "bid_amount"))
            .transpose()?;

        let start_time = self
            .start_time
            .as_deref()
            .map(|t| parse_time(t, "start_time"))
            .transpose()?;
        let end_time = self
            .end_time
            .as_deref()
            .map(|t| parse_time(t, "end_time"))
            .transpose()?;
        if let (Some(start), Some(end)) = (start_time, end_time) {
            if end <= start {
                return Err(ValidationError::InvalidField {
                    field: "end_time",
                    reason: "must be after start_time".to_string(),
                });
            }
        }

        let title = self
            .ad_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());

        Ok(Plan {
            account: self.account,
            name,
            objective: self.objective,
            custom_audience_id,
            daily_budget,
            bid_amount,
            start_time,
            end_time,
            targeting: self.targeting.unwrap_or_default(),
            page_id,
            link,
            message,
            title,
        })
    }
}

fn remote_failure(stage: Stage, created: PartialProgress, source: FacebookApiError) -> CampaignError {
    warn!(%stage, error = %source, ?created, "campaign chain stopped");
    CampaignError::Remote {
        stage,
        created,
        source,
    }
}

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

struct CampaignCreated {
    campaign: Campaign,
}

struct AdSetCreated {
    campaign: Campaign,
    ad_set: AdSet,
}

struct CreativeCreated {
    campaign: Campaign,
    ad_set: AdSet,
    creative: Creative,
}

async fn create_campaign<A: GraphApi + ?Sized>(
    api: &A,
    plan: &Plan,
) -> Result<CampaignCreated, CampaignError> {
    let body = params(json!({
        "name": plan.name,
        "objective": plan.objective.as_str(),
        "status": INITIAL_STATUS,
        "special_ad_categories": [SPECIAL_AD_CATEGORY_NONE],
    }));

    let created = api
        .create(&plan.account.edge("campaigns"), body)
        .await
        .map_err(|e| remote_failure(Stage::Campaign, PartialProgress::default(), e))?;
    info!(campaign_id = %created.id, "campaign created");

    Ok(CampaignCreated {
        campaign: Campaign {
            id: created.id,
            name: plan.name.clone(),
            objective: plan.objective,
            status: INITIAL_STATUS.to_string(),
        },
    })
}

impl CampaignCreated {
    fn progress(&self) -> PartialProgress {
        PartialProgress {
            campaign_id: Some(self.campaign.id.clone()),
            ..PartialProgress::default()
        }
    }

    async fn create_ad_set<A: GraphApi + ?Sized>(
        self,
        api: &A,
        plan: &Plan,
    ) -> Result<AdSetCreated, CampaignError> {
        let mut targeting = plan.targeting.clone();
        targeting.insert(
            "custom_audiences".to_string(),
            json!([{ "id": plan.custom_audience_id }]),
        );

        let mut body = params(json!({
            "name": format!("{} Ad Set", plan.name),
            "campaign_id": self.campaign.id,
            "daily_budget": plan.daily_budget,
            "billing_event": BILLING_EVENT,
            "optimization_goal": plan.objective.optimization_goal(),
            "targeting": targeting,
            "status": INITIAL_STATUS,
        }));
        if let Some(bid) = plan.bid_amount {
            body.insert("bid_amount".to_string(), json!(bid));
        }
        if let Some(start) = plan.start_time {
            body.insert(
                "start_time".to_string(),
                json!(start.format(GRAPH_TIME_FORMAT).to_string()),
            );
        }
        if let Some(end) = plan.end_time {
            body.insert(
                "end_time".to_string(),
                json!(end.format(GRAPH_TIME_FORMAT).to_string()),
            );
        }

        let created = match api.create(&plan.account.edge("adsets"), body).await {
            Ok(created) => created,
            Err(e) => return Err(remote_failure(Stage::AdSet, self.progress(), e)),
        };
        info!(adset_id = %created.id, campaign_id = %self.campaign.id, "ad set created");

        let ad_set = AdSet {
            id: created.id,
            campaign_id: self.campaign.id.clone(),
            daily_budget: plan.daily_budget,
            targeting: Targeting {
                custom_audience_ids: vec![plan.custom_audience_id.clone()],
            },
            billing_event: BILLING_EVENT.to_string(),
            optimization_goal: plan.objective.optimization_goal().to_string(),
            status: INITIAL_STATUS.to_string(),
        };

        Ok(AdSetCreated {
            campaign: self.campaign,
            ad_set,
        })
    }
}

impl AdSetCreated {
    fn progress(&self) -> PartialProgress {
        PartialProgress {
            campaign_id: Some(self.campaign.id.clone()),
            adset_id: Some(self.ad_set.id.clone()),
            creative_id: None,
        }
    }

    // The creative does not reference the ad set; it only runs after it.
    async fn create_creative<A: GraphApi + ?Sized>(
        self,
        api: &A,
        plan: &Plan,
    ) -> Result<CreativeCreated, CampaignError> {
        let body = params(json!({
            "name": format!("{} Creative", plan.name),
            "object_story_spec": {
                "page_id": plan.page_id,
                "link_data": {
                    "link": plan.link,
                    "message": plan.message,
                    "name": plan.title,
                },
            },
        }));

        let created = match api.create(&plan.account.edge("adcreatives"), body).await {
            Ok(created) => created,
            Err(e) => return Err(remote_failure(Stage::Creative, self.progress(), e)),
        };
        info!(creative_id = %created.id, "ad creative created");

        Ok(CreativeCreated {
            campaign: self.campaign,
            ad_set: self.ad_set,
            creative: Creative {
                id: created.id,
                page_id: plan.page_id.clone(),
                link: plan.link.clone(),
                message: plan.message.clone(),
                title: plan.title.clone(),
            },
        })
    }
}

impl CreativeCreated {
    fn progress(&self) -> PartialProgress {
        PartialProgress {
            campaign_id: Some(self.campaign.id.clone()),
            adset_id: Some(self.ad_set.id.clone()),
            creative_id: Some(self.creative.id.clone()),
        }
    }

    async fn create_ad<A: GraphApi + ?Sized>(
        self,
        api: &A,
        plan: &Plan,
    ) -> Result<CampaignChain, CampaignError> {
        let body = params(json!({
            "name": format!("{} Ad", plan.name),
            "adset_id": self.ad_set.id,
            "creative": { "creative_id": self.creative.id },
            "status": INITIAL_STATUS,
        }));

        let created = match api.create(&plan.account.edge("ads"), body).await {
            Ok(created) => created,
            Err(e) => return Err(remote_failure(Stage::Ad, self.progress(), e)),
        };
        info!(ad_id = %created.id, "ad created");

        let ad = Ad {
            id: created.id,
            adset_id: self.ad_set.id.clone(),
            creative_id: self.creative.id.clone(),
            status: INITIAL_STATUS.to_string(),
        };

        Ok(CampaignChain {
            campaign: self.campaign,
            ad_set: self.ad_set,
            creative: self.creative,
            ad,
        })
    }
}

/// Creates campaign, ad set, creative and ad in that order, each exactly
/// once and each starting only after the previous id is confirmed.
///
/// Everything is created `PAUSED`. A failure at any step stops the chain
/// and reports the ids already created.
pub async fn create_ad_campaign<A: GraphApi + ?Sized>(
    api: &A,
    request: CampaignRequest,
) -> Result<CampaignChain, CampaignError> {
    let plan = request.plan()?;
    info!(
        account = %plan.account,
        name = %plan.name,
        objective = plan.objective.as_str(),
        daily_budget = plan.daily_budget,
        "creating campaign chain"
    );

    create_campaign(api, &plan)
        .await?
        .create_ad_set(api, &plan)
        .await?
        .create_creative(api, &plan)
        .await?
        .create_ad(api, &plan)
        .await
}
