//! Tracer：观测者注册表 + 输出流所有者

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, error, info};

use super::observer::Observer;
use super::stream::{OutputStream, StreamFactory, StreamId};
use super::{Hook, Metric, Subject, TraceError};
use crate::sim::SimTime;

#[derive(Default)]
pub struct Tracer {
    factory: Option<Box<dyn StreamFactory>>,
    streams: Vec<OutputStream>,
    by_name: HashMap<String, StreamId>,
    observers: HashMap<Subject, Vec<Observer>>,
    sealed: bool,
    fault: Option<TraceError>,
}

impl Tracer {
    pub fn new(factory: Box<dyn StreamFactory>) -> Self {
        Self {
            factory: Some(factory),
            ..Self::default()
        }
    }

    /// 为 `subject` 注册一个 `metric` 观测者，返回其输出流。
    ///
    /// 同名流只打开一次（`rx` 由所有流共享）。运行开始后（`seal` 之后）不再接受注册。
    pub fn attach(
        &mut self,
        subject: Subject,
        metric: Metric,
        flow_index: usize,
    ) -> Result<StreamId, TraceError> {
        if self.sealed {
            return Err(TraceError::LateAttach { metric });
        }
        if !metric.accepts(subject) {
            return Err(TraceError::SubjectMismatch { metric, subject });
        }

        let name = metric.stream_name(flow_index);
        let stream = match self.by_name.get(&name) {
            Some(id) => *id,
            None => {
                let factory = self.factory.as_mut().ok_or(TraceError::NoSink)?;
                let out = factory.open(&name).map_err(|source| TraceError::Open {
                    name: name.clone(),
                    source,
                })?;
                let id = StreamId(self.streams.len());
                self.streams.push(OutputStream::new(name.clone(), out));
                self.by_name.insert(name.clone(), id);
                id
            }
        };

        debug!(?subject, %metric, flow_index, stream = %name, "注册观测者");
        self.observers
            .entry(subject)
            .or_default()
            .push(Observer::new(metric, stream, flow_index));
        Ok(stream)
    }

    /// 运行开始：此后禁止注册
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// 该对象是否有人观测（发送端据此跳过无用的格式化）
    pub fn is_observed(&self, subject: Subject) -> bool {
        self.observers.contains_key(&subject)
    }

    /// 钩子触发：同步写入所有匹配的观测者。写失败只记录第一个错误，在 `close` 时返回。
    pub fn fire(&mut self, now: SimTime, subject: Subject, hook: Hook) {
        let Some(observers) = self.observers.get_mut(&subject) else {
            return;
        };
        let metric = hook.metric();
        for obs in observers.iter_mut().filter(|o| o.metric() == metric) {
            let out = &mut self.streams[obs.stream().0];
            if let Err(source) = obs.record(now, &hook, out) {
                error!(stream = out.name(), %source, "trace 写入失败");
                if self.fault.is_none() {
                    self.fault = Some(TraceError::Write {
                        name: out.name().to_string(),
                        source,
                    });
                }
            }
        }
    }

    pub fn stream(&self, id: StreamId) -> Option<&OutputStream> {
        self.streams.get(id.0)
    }

    pub fn streams(&self) -> impl Iterator<Item = &OutputStream> {
        self.streams.iter()
    }

    /// 落盘并关闭所有输出流，返回 (流名, 记录数)。
    pub fn close(&mut self) -> Result<Vec<(String, u64)>, TraceError> {
        if let Some(err) = self.fault.take() {
            return Err(err);
        }
        let mut summary = Vec::with_capacity(self.streams.len());
        for mut out in self.streams.drain(..) {
            out.flush().map_err(|source| TraceError::Write {
                name: out.name().to_string(),
                source,
            })?;
            summary.push((out.name().to_string(), out.records()));
        }
        self.by_name.clear();
        self.observers.clear();
        info!(streams = summary.len(), "trace 输出流已关闭");
        Ok(summary)
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("streams", &self.streams)
            .field("observers", &self.observers)
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}
