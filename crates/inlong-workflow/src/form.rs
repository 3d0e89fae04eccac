//! Process and task forms
//!
//! Forms travel as JSON tagged by `formName`. A process form describes what
//! the process works on (a group, a consumption); a task form carries what an
//! approver filled in.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, WorkflowError};

/// Message queue backing an InLong group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MqType {
    Tube,
    Pulsar,
    Kafka,
    None,
}

/// Operation requested on an existing group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupOperateType {
    #[default]
    Init,
    Suspend,
    Restart,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub inlong_group_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub mq_type: MqType,
    #[serde(default)]
    pub enable_zookeeper: bool,
    #[serde(default)]
    pub in_charges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkInfo {
    pub sink_name: String,
    pub sink_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub inlong_group_id: String,
    pub inlong_stream_id: String,
    #[serde(default)]
    pub sinks: Vec<SinkInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionInfo {
    pub consumer_group: String,
    pub inlong_group_id: String,
    pub topic: String,
    #[serde(default)]
    pub in_charges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroupProcessForm {
    pub group_info: Option<GroupInfo>,
    #[serde(default)]
    pub stream_infos: Vec<StreamInfo>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConsumptionProcessForm {
    pub consumption_info: Option<ConsumptionInfo>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResourceProcessForm {
    pub group_info: Option<GroupInfo>,
    #[serde(default)]
    pub stream_infos: Vec<StreamInfo>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupProcessForm {
    pub group_info: Option<GroupInfo>,
    #[serde(default)]
    pub group_operate_type: GroupOperateType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightGroupResourceProcessForm {
    pub group_info: Option<GroupInfo>,
    #[serde(default)]
    pub stream_infos: Vec<StreamInfo>,
    #[serde(default)]
    pub group_operate_type: GroupOperateType,
}

/// Form attached to a process instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "formName")]
pub enum ProcessForm {
    #[serde(rename = "NewGroupProcessForm")]
    NewGroup(NewGroupProcessForm),
    #[serde(rename = "NewConsumptionProcessForm")]
    NewConsumption(NewConsumptionProcessForm),
    #[serde(rename = "GroupResourceProcessForm")]
    GroupResource(GroupResourceProcessForm),
    #[serde(rename = "UpdateGroupProcessForm")]
    UpdateGroup(UpdateGroupProcessForm),
    #[serde(rename = "LightGroupResourceProcessForm")]
    LightGroupResource(LightGroupResourceProcessForm),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessFormKind {
    NewGroup,
    NewConsumption,
    GroupResource,
    UpdateGroup,
    LightGroupResource,
}

impl ProcessFormKind {
    pub fn form_name(&self) -> &'static str {
        match self {
            ProcessFormKind::NewGroup => "NewGroupProcessForm",
            ProcessFormKind::NewConsumption => "NewConsumptionProcessForm",
            ProcessFormKind::GroupResource => "GroupResourceProcessForm",
            ProcessFormKind::UpdateGroup => "UpdateGroupProcessForm",
            ProcessFormKind::LightGroupResource => "LightGroupResourceProcessForm",
        }
    }
}

impl fmt::Display for ProcessFormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.form_name())
    }
}

fn require<'a, T>(value: Option<&'a T>, message: &str) -> Result<&'a T> {
    value.ok_or_else(|| WorkflowError::FormValidation(message.to_string()))
}

impl ProcessForm {
    pub fn kind(&self) -> ProcessFormKind {
        match self {
            ProcessForm::NewGroup(_) => ProcessFormKind::NewGroup,
            ProcessForm::NewConsumption(_) => ProcessFormKind::NewConsumption,
            ProcessForm::GroupResource(_) => ProcessFormKind::GroupResource,
            ProcessForm::UpdateGroup(_) => ProcessFormKind::UpdateGroup,
            ProcessForm::LightGroupResource(_) => ProcessFormKind::LightGroupResource,
        }
    }

    pub fn form_name(&self) -> &'static str {
        self.kind().form_name()
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ProcessForm::NewGroup(form) => {
                require(form.group_info.as_ref(), "inlong group info is empty")?;
            }
            ProcessForm::NewConsumption(form) => {
                require(form.consumption_info.as_ref(), "consumption info is empty")?;
            }
            ProcessForm::GroupResource(form) => {
                require(form.group_info.as_ref(), "inlong group info is empty")?;
            }
            ProcessForm::UpdateGroup(form) => {
                require(form.group_info.as_ref(), "inlong group info is empty")?;
            }
            ProcessForm::LightGroupResource(form) => {
                require(form.group_info.as_ref(), "inlong group does not exist")?;
            }
        }
        Ok(())
    }

    pub fn group_info(&self) -> Option<&GroupInfo> {
        match self {
            ProcessForm::NewGroup(form) => form.group_info.as_ref(),
            ProcessForm::GroupResource(form) => form.group_info.as_ref(),
            ProcessForm::UpdateGroup(form) => form.group_info.as_ref(),
            ProcessForm::LightGroupResource(form) => form.group_info.as_ref(),
            ProcessForm::NewConsumption(_) => None,
        }
    }

    pub fn inlong_group_id(&self) -> Option<&str> {
        match self {
            ProcessForm::NewConsumption(form) => form
                .consumption_info
                .as_ref()
                .map(|info| info.inlong_group_id.as_str()),
            _ => self.group_info().map(|info| info.inlong_group_id.as_str()),
        }
    }

    pub fn stream_infos(&self) -> &[StreamInfo] {
        match self {
            ProcessForm::NewGroup(form) => &form.stream_infos,
            ProcessForm::GroupResource(form) => &form.stream_infos,
            ProcessForm::LightGroupResource(form) => &form.stream_infos,
            ProcessForm::NewConsumption(_) | ProcessForm::UpdateGroup(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupApproveInfo {
    pub inlong_group_id: String,
    pub mq_type: MqType,
    #[serde(default)]
    pub topic_partition_num: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamApproveInfo {
    pub inlong_group_id: String,
    pub inlong_stream_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionApproveInfo {
    pub consumer_group: String,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroupApproveForm {
    pub group_approve_info: Option<GroupApproveInfo>,
    #[serde(default)]
    pub stream_approve_infos: Vec<StreamApproveInfo>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConsumptionApproveForm {
    pub consumption_approve_info: Option<ConsumptionApproveInfo>,
}

/// Form an approver submits with a task action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "formName")]
pub enum TaskForm {
    #[serde(rename = "NewGroupApproveForm")]
    NewGroupApprove(NewGroupApproveForm),
    #[serde(rename = "NewConsumptionApproveForm")]
    NewConsumptionApprove(NewConsumptionApproveForm),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskFormKind {
    NewGroupApprove,
    NewConsumptionApprove,
}

impl TaskFormKind {
    pub fn form_name(&self) -> &'static str {
        match self {
            TaskFormKind::NewGroupApprove => "NewGroupApproveForm",
            TaskFormKind::NewConsumptionApprove => "NewConsumptionApproveForm",
        }
    }
}

impl fmt::Display for TaskFormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.form_name())
    }
}

impl TaskForm {
    pub fn kind(&self) -> TaskFormKind {
        match self {
            TaskForm::NewGroupApprove(_) => TaskFormKind::NewGroupApprove,
            TaskForm::NewConsumptionApprove(_) => TaskFormKind::NewConsumptionApprove,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TaskForm::NewGroupApprove(form) => {
                let group = require(form.group_approve_info.as_ref(), "group approve info is empty")?;
                // Stream approvals must stay inside the approved group
                if let Some(stream) = form
                    .stream_approve_infos
                    .iter()
                    .find(|stream| stream.inlong_group_id != group.inlong_group_id)
                {
                    return Err(WorkflowError::FormValidation(format!(
                        "stream {} belongs to group {}, not {}",
                        stream.inlong_stream_id, stream.inlong_group_id, group.inlong_group_id
                    )));
                }
            }
            TaskForm::NewConsumptionApprove(form) => {
                let info = require(
                    form.consumption_approve_info.as_ref(),
                    "consumption approve info is empty",
                )?;
                if info.consumer_group.trim().is_empty() {
                    return Err(WorkflowError::FormValidation(
                        "consumer group cannot be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}
