// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Keyword-driven assistant over a patient's fall history

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::FallEvent;

pub const WELCOME_MESSAGE: &str = "Welcome to the SafeFall Analysis Assistant. I can help you \
understand your fall detection data and provide insights. Try asking:\n\n\
• \"How many falls occurred this week?\"\n\
• \"Show my emergency trends\"\n\
• \"What's my fall detection summary?\"\n\
• \"Why was my last fall marked as emergency?\"";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub total_falls: usize,
    pub emergencies: usize,
    pub false_alarms: usize,
    pub last_week_falls: usize,
    pub avg_falls_per_week: f64,
    pub most_recent_fall: Option<DateTime<Utc>>,
}

impl Analytics {
    pub fn from_events(events: &[FallEvent], now: DateTime<Utc>) -> Self {
        let week_ago = now - Duration::days(7);
        let oldest = events.iter().map(|e| e.timestamp).min();

        let weeks = match oldest {
            Some(oldest) => {
                let span = (now - oldest).num_milliseconds().max(0) as f64;
                let week = Duration::days(7).num_milliseconds() as f64;
                (span / week).ceil().max(1.0)
            }
            None => 1.0,
        };
        let average = events.len() as f64 / weeks;

        Self {
            total_falls: events.len(),
            emergencies: events.iter().filter(|e| e.is_emergency).count(),
            false_alarms: events
                .iter()
                .filter(|e| !e.is_emergency && e.resolved)
                .count(),
            last_week_falls: events.iter().filter(|e| e.timestamp >= week_ago).count(),
            avg_falls_per_week: (average * 10.0).round() / 10.0,
            most_recent_fall: events.iter().map(|e| e.timestamp).max(),
        }
    }

    /// Share of falls that became emergencies, in whole percent
    pub fn emergency_rate(&self) -> u32 {
        if self.total_falls == 0 {
            return 0;
        }
        ((self.emergencies as f64 / self.total_falls as f64) * 100.0).round() as u32
    }

    pub fn respond(&self, query: &str) -> String {
        let q = query.to_lowercase();

        if q.contains("week") && (q.contains("fall") || q.contains("how many")) {
            return format!(
                "**This Week's Falls**\n\nYou had **{} fall events** in the past 7 days.\n\n\
                 • Emergencies: {}\n• False alarms: {}\n\n\
                 Your average is {} falls per week.",
                self.last_week_falls, self.emergencies, self.false_alarms, self.avg_falls_per_week
            );
        }

        if q.contains("summary") || q.contains("overview") || q.contains("stats") {
            let mut out = format!(
                "**Your Fall Detection Summary**\n\n\
                 • **Total Falls Detected:** {}\n• **Emergencies:** {}\n\
                 • **False Alarms:** {}\n• **Last Week:** {} falls\n\
                 • **Weekly Average:** {} falls\n",
                self.total_falls,
                self.emergencies,
                self.false_alarms,
                self.last_week_falls,
                self.avg_falls_per_week
            );
            if let Some(recent) = self.most_recent_fall {
                out.push_str(&format!(
                    "\n• **Most Recent:** {}",
                    recent.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
            return out;
        }

        if q.contains("trend") || q.contains("pattern") {
            let rate = self.emergency_rate();
            let verdict = if rate > 50 {
                "Your emergency rate is high. Consider reviewing your fall detection sensitivity."
            } else {
                "Your false alarm rate is healthy, indicating good detection accuracy."
            };
            return format!(
                "**Emergency Trends**\n\n• Emergency rate: **{}%** of detected falls\n\
                 • Total emergencies: {}\n• False alarm rate: {}%\n\n{}",
                rate,
                self.emergencies,
                100 - rate,
                verdict
            );
        }

        if q.contains("why") && q.contains("emergency") {
            let tally = if self.emergencies > 0 {
                format!("You've had {} emergency-classified events.", self.emergencies)
            } else {
                "You haven't had any emergency-classified falls yet.".to_string()
            };
            return format!(
                "**Emergency Classification Criteria**\n\n\
                 A fall is marked as an **emergency** when:\n\n\
                 1. The 30-second countdown completes without response\n\
                 2. You press \"Emergency - Need Help!\" during the countdown\n\n{}",
                tally
            );
        }

        if q.contains("last") && q.contains("fall") {
            return match self.most_recent_fall {
                None => "You don't have any recorded fall events yet.".to_string(),
                Some(recent) => format!(
                    "**Most Recent Fall**\n\nYour last fall was detected on:\n**{}**\nat {}\n\n\
                     Check your Fall History for complete details.",
                    recent.format("%A, %B %-d, %Y"),
                    recent.format("%H:%M:%S UTC")
                ),
            };
        }

        if q.contains("help") || q.contains("what can you") {
            return "**SafeFall Analysis Assistant**\n\n\
                    I analyze your fall detection data to provide insights. I can help with:\n\n\
                    • **Weekly Reports:** \"How many falls this week?\"\n\
                    • **Summaries:** \"Show my fall summary\"\n\
                    • **Trends:** \"What are my emergency trends?\"\n\
                    • **Explanations:** \"Why was a fall marked as emergency?\"\n\
                    • **Recent Events:** \"When was my last fall?\"\n\n\
                    Note: I'm an analytics assistant, not a general chatbot. \
                    My responses are based on your recorded data."
                .to_string();
        }

        format!(
            "I understand you're asking about \"{}\". As an analytics assistant, I focus on \
             your fall detection data insights.\n\n**Try asking:**\n\
             • \"Show my fall summary\"\n• \"How many falls this week?\"\n\
             • \"What are my emergency trends?\"\n\n\
             For other questions, please contact your healthcare provider.",
            query
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::fixtures::event;
    use chrono::TimeZone;

    fn sample(now: DateTime<Utc>) -> Analytics {
        let events = vec![
            event(now - Duration::days(1), true, false),
            event(now - Duration::days(2), false, true),
            event(now - Duration::days(20), true, true),
        ];
        Analytics::from_events(&events, now)
    }

    #[test]
    fn test_counts_and_average() {
        let now = Utc::now();
        let a = sample(now);
        assert_eq!(a.total_falls, 3);
        assert_eq!(a.emergencies, 2);
        assert_eq!(a.false_alarms, 1);
        assert_eq!(a.last_week_falls, 2);
        // 20 days spans 3 started weeks
        assert_eq!(a.avg_falls_per_week, 1.0);
        assert_eq!(a.emergency_rate(), 67);
    }

    #[test]
    fn test_empty_history() {
        let a = Analytics::from_events(&[], Utc::now());
        assert_eq!(a.avg_falls_per_week, 0.0);
        assert_eq!(a.emergency_rate(), 0);
        assert_eq!(
            a.respond("when was my last fall?"),
            "You don't have any recorded fall events yet."
        );
    }

    #[test]
    fn test_keyword_routing() {
        let a = sample(Utc::now());
        assert!(a.respond("How many falls this week?").contains("**2 fall events**"));
        assert!(a.respond("show my stats").starts_with("**Your Fall Detection Summary**"));
        assert!(a.respond("Emergency trends").contains("Your emergency rate is high"));
        assert!(a.respond("Why was it an emergency?").contains("2 emergency-classified events"));
        assert!(a.respond("help").contains("not a general chatbot"));
        assert!(a.respond("what's the weather").contains("\"what's the weather\""));
    }

    #[test]
    fn test_last_fall_date_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let a = Analytics::from_events(&[event(now - Duration::hours(2), false, false)], now);
        let reply = a.respond("last fall");
        assert!(reply.contains("**Saturday, March 9, 2024**"));
        assert!(reply.contains("at 10:00:00 UTC"));
    }
}
