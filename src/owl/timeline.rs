//! Per-participant timelines
//!
//! Groups finished events by participant and merges overlapping intervals
//! of the same kind, then renders them as a Google Charts timeline page.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::events::{EventKind, EventRecord, ParticipantId};
use crate::identity::Timestamp;

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineInterval {
    pub participant: ParticipantId,
    pub kind: EventKind,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Intervals ordered by participant, then start time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    intervals: Vec<TimelineInterval>,
}

impl Timeline {
    pub fn from_records(records: &[EventRecord]) -> Self {
        let mut spans: BTreeMap<(ParticipantId, EventKind), Vec<(Timestamp, Timestamp)>> =
            BTreeMap::new();
        for record in records {
            let Some(end) = record.end() else {
                continue;
            };
            for participant in record.participants() {
                spans
                    .entry((participant.clone(), record.kind()))
                    .or_default()
                    .push((record.start(), end));
            }
        }

        let mut intervals = Vec::new();
        for ((participant, kind), mut list) in spans {
            list.sort();
            let mut merged: Vec<(Timestamp, Timestamp)> = Vec::with_capacity(list.len());
            for (start, end) in list {
                match merged.last_mut() {
                    Some(last) if start <= last.1 => last.1 = last.1.max(end),
                    _ => merged.push((start, end)),
                }
            }
            intervals.extend(merged.into_iter().map(|(start, end)| TimelineInterval {
                participant: participant.clone(),
                kind,
                start,
                end,
            }));
        }
        intervals.sort_by(|a, b| {
            a.participant
                .cmp(&b.participant)
                .then(a.start.cmp(&b.start))
                .then(a.kind.cmp(&b.kind))
        });
        Self { intervals }
    }

    pub fn intervals(&self) -> &[TimelineInterval] {
        &self.intervals
    }

    pub fn for_participant<'a>(
        &'a self,
        id: &'a ParticipantId,
    ) -> impl Iterator<Item = &'a TimelineInterval> + 'a {
        self.intervals.iter().filter(move |i| &i.participant == id)
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Standalone HTML page with one chart row per interval (times in ms)
    pub fn to_html(&self, title: &str) -> String {
        let mut rows = String::new();
        for interval in &self.intervals {
            let _ = writeln!(
                rows,
                "      ['{}', '{}', {}, {}],",
                js_escape(interval.participant.as_str()),
                interval.kind.owl_class(),
                (interval.start.secs() * 1000.0).round() as i64,
                (interval.end.secs() * 1000.0).round() as i64,
            );
        }

        format!(
            r#"<html>
<head>
  <title>{title}</title>
  <script type="text/javascript" src="https://www.gstatic.com/charts/loader.js"></script>
  <script type="text/javascript">
    google.charts.load('current', {{'packages':['timeline']}});
    google.charts.setOnLoadCallback(drawChart);
    function drawChart() {{
      var container = document.getElementById('semlog_timeline');
      var chart = new google.visualization.Timeline(container);
      var dataTable = new google.visualization.DataTable();
      dataTable.addColumn({{ type: 'string', id: 'Participant' }});
      dataTable.addColumn({{ type: 'string', id: 'Event' }});
      dataTable.addColumn({{ type: 'number', id: 'Start' }});
      dataTable.addColumn({{ type: 'number', id: 'End' }});
      dataTable.addRows([
{rows}      ]);
      chart.draw(dataTable);
    }}
  </script>
</head>
<body>
  <div id="semlog_timeline" style="height: 100%;"></div>
</body>
</html>
"#,
            title = html_escape(title),
            rows = rows,
        )
    }
}

fn js_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Ledger, Metadata, Properties};
    use crate::identity::IdAllocator;

    fn closed(ledger: &mut Ledger, kind: EventKind, ids: &[&str], start: f64, end: f64) {
        let participants = ids.iter().map(|id| ParticipantId::from(*id)).collect();
        let key = ledger
            .open_event(kind, participants, Timestamp(start), Properties::new())
            .unwrap();
        ledger.close(&key, Timestamp(end), Properties::new());
    }

    #[test]
    fn test_intervals_grouped_and_merged() {
        let mut ledger = Ledger::new(Metadata::new("ep", "log"), IdAllocator::sequential("ev_"));
        closed(&mut ledger, EventKind::Touching, &["A", "B"], 1.0, 3.0);
        closed(&mut ledger, EventKind::Touching, &["A", "C"], 2.0, 4.0);
        closed(&mut ledger, EventKind::Touching, &["A", "B"], 6.0, 7.0);
        closed(&mut ledger, EventKind::Grasping, &["H", "A"], 2.5, 3.5);

        let timeline = Timeline::from_records(ledger.finished());
        let a = ParticipantId::from("A");
        let spans: Vec<(EventKind, f64, f64)> = timeline
            .for_participant(&a)
            .map(|i| (i.kind, i.start.secs(), i.end.secs()))
            .collect();
        assert_eq!(
            spans,
            vec![
                (EventKind::Touching, 1.0, 4.0),
                (EventKind::Grasping, 2.5, 3.5),
                (EventKind::Touching, 6.0, 7.0),
            ]
        );
        assert_eq!(timeline.for_participant(&ParticipantId::from("B")).count(), 2);
    }

    #[test]
    fn test_html_rows() {
        let mut ledger = Ledger::new(Metadata::new("ep", "log"), IdAllocator::sequential("ev_"));
        closed(&mut ledger, EventKind::Sliding, &["Hand", "Plate"], 0.5, 1.25);
        let html = Timeline::from_records(ledger.finished()).to_html("ep <1>");
        assert!(html.contains("['Hand', 'SlidingSituation', 500, 1250],"));
        assert!(html.contains("<title>ep &lt;1&gt;</title>"));
        assert!(html.contains("google.visualization.Timeline"));
    }
}
