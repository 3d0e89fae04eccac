//! Selectors deciding whether a service task listener takes part in a dispatch

use tracing::warn;

use crate::context::WorkflowContext;
use crate::form::{GroupInfo, GroupOperateType, MqType, ProcessForm};

/// Pure predicate over the workflow context
pub trait EventSelector: Send + Sync {
    fn accept(&self, context: &WorkflowContext) -> bool;
}

impl<F> EventSelector for F
where
    F: Fn(&WorkflowContext) -> bool + Send + Sync,
{
    fn accept(&self, context: &WorkflowContext) -> bool {
        self(context)
    }
}

fn group_resource(context: &WorkflowContext) -> Option<(&GroupInfo, &ProcessForm)> {
    let form = context.process_form.as_ref()?;
    match form {
        ProcessForm::GroupResource(inner) => inner.group_info.as_ref().map(|group| (group, form)),
        _ => None,
    }
}

/// Sort listeners for light groups: needs at least one stream
#[derive(Debug, Clone, Copy, Default)]
pub struct LightGroupSortSelector;

impl EventSelector for LightGroupSortSelector {
    fn accept(&self, context: &WorkflowContext) -> bool {
        let Some(ProcessForm::LightGroupResource(form)) = context.process_form.as_ref() else {
            return false;
        };
        if form.stream_infos.is_empty() {
            warn!(
                group_id = ?context.inlong_group_id(),
                "inlong stream does not exist, skipping light group sort listener"
            );
            return false;
        }
        true
    }
}

/// Queue listeners for groups backed by one MQ type
#[derive(Debug, Clone, Copy)]
pub struct MqTypeSelector {
    mq_type: MqType,
}

impl MqTypeSelector {
    pub fn new(mq_type: MqType) -> Self {
        Self { mq_type }
    }

    pub fn tube() -> Self {
        Self::new(MqType::Tube)
    }

    pub fn pulsar() -> Self {
        Self::new(MqType::Pulsar)
    }
}

impl EventSelector for MqTypeSelector {
    fn accept(&self, context: &WorkflowContext) -> bool {
        group_resource(context).is_some_and(|(group, _)| group.mq_type == self.mq_type)
    }
}

/// Sort listeners split by whether the group pushes sort config via ZooKeeper
#[derive(Debug, Clone, Copy)]
pub struct ZookeeperSelector {
    enabled: bool,
}

impl ZookeeperSelector {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

impl EventSelector for ZookeeperSelector {
    fn accept(&self, context: &WorkflowContext) -> bool {
        group_resource(context).is_some_and(|(group, _)| group.enable_zookeeper == self.enabled)
    }
}

/// Source listeners for one operation on an existing group
#[derive(Debug, Clone, Copy)]
pub struct SourceOperateSelector {
    operate_type: GroupOperateType,
}

impl SourceOperateSelector {
    pub fn stop() -> Self {
        Self { operate_type: GroupOperateType::Suspend }
    }

    pub fn restart() -> Self {
        Self { operate_type: GroupOperateType::Restart }
    }

    pub fn delete() -> Self {
        Self { operate_type: GroupOperateType::Delete }
    }
}

impl EventSelector for SourceOperateSelector {
    fn accept(&self, context: &WorkflowContext) -> bool {
        matches!(
            context.process_form.as_ref(),
            Some(ProcessForm::UpdateGroup(form))
                if form.group_info.is_some() && form.group_operate_type == self.operate_type
        )
    }
}

/// Sink listeners for one sink type
#[derive(Debug, Clone)]
pub struct SinkTypeSelector {
    sink_type: String,
}

impl SinkTypeSelector {
    pub fn new(sink_type: impl Into<String>) -> Self {
        Self { sink_type: sink_type.into() }
    }
}

impl EventSelector for SinkTypeSelector {
    fn accept(&self, context: &WorkflowContext) -> bool {
        group_resource(context).is_some_and(|(_, form)| {
            form.stream_infos()
                .iter()
                .flat_map(|stream| stream.sinks.iter())
                .any(|sink| sink.sink_type.eq_ignore_ascii_case(&self.sink_type))
        })
    }
}
