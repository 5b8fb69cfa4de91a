use anyhow::{anyhow, Result};
use std::str::FromStr;

pub const DISCORD_INVITE: &str = "https://discord.gg/3p3ff9PHqW";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    Swapfest,
    Vote,
}

impl FromStr for Page {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "home" => Ok(Page::Home),
            "swapfest" => Ok(Page::Swapfest),
            "vote" => Ok(Page::Vote),
            other => Err(anyhow!(
                "Unknown page '{}'. Expected one of: home, swapfest, vote.",
                other
            )),
        }
    }
}

pub mod layout {
    use super::DISCORD_INVITE;
    use crate::wallet::CurrentUser;

    const BUY_MVP: &str = "https://app.increment.fi/swap?in=A.1654653399040a61.FlowToken&out=A.6fd2465f3a22e34c.PetJokicsHorses";

    pub fn header(user: &CurrentUser) -> String {
        let wallet = match (&user.addr, user.logged_in) {
            (Some(addr), true) => format!("{}  [Disconnect]", addr),
            _ => "[Connect Wallet]".to_string(),
        };
        format!(
            "MVP on Flow | Home | Swapfest | Vote | Buy $MVP ({})\n{}",
            BUY_MVP, wallet
        )
    }

    pub fn footer() -> String {
        format!(
            "This is a fan project and is not affiliated with NBA TopShot, Nikola Jokić, or any official organization.\nDiscord: {}  X: https://x.com/petjokicshorses",
            DISCORD_INVITE
        )
    }

    /// Wraps a page body in the shared header and footer.
    pub fn page(user: &CurrentUser, body: &str) -> String {
        let rule = "=".repeat(72);
        format!(
            "{}\n{}\n\n{}\n\n{}\n{}",
            header(user),
            rule,
            body.trim_end(),
            rule,
            footer()
        )
    }
}

pub mod home {
    use super::DISCORD_INVITE;

    pub fn render() -> String {
        [
            "MVP on Flow - Pet Jokic's Horses".to_string(),
            String::new(),
            "MVP on Flow, also known as Pet Jokic's horses, is a fan-powered project celebrating Nikola Jokic and his NBA TopShot moments on the Flow blockchain.".to_string(),
            "Join our Discord community for Jokic-themed fun, prediction contests, raffles, giveaways, and more!".to_string(),
            "Earn and use $MVP tokens in community games, swap them for Jokic moments, trade them on Flow exchanges or stake them to earn rewards. Whether you're a collector or a fan, there's something for everyone.".to_string(),
            format!("Join Our Discord: {}", DISCORD_INVITE),
            String::new(),
            "$MVP Tokenomics, Exchange and Rewards".to_string(),
            "Learn how $MVP works: buy, sell or swap Jokic moments using $MVP".to_string(),
            "(see /images/Tokenomics.svg)".to_string(),
        ]
        .join("\n")
    }
}

pub mod swapfest {
    use crate::leaderboard::{render_table, rows, HttpSource, LeaderboardView, LoadState};
    use anyhow::{Context, Result};
    use chrono::TimeZone;
    use std::fmt::Display;
    use std::sync::Arc;
    use tracing::warn;

    pub const TITLE: &str = "$MVP Season Start Swap Fest Ending Oct 21st";

    const TIE_NOTE: &str = "* Ties on points are ranked by earlier \"Last scored at\".";

    pub fn render<Tz>(load: &LoadState, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        format!(
            "{}\n(rules: /images/25-8-15-9-25.png)\n\nPrize Pool: {} chances to pet your horse\n\n{}\n\n{}",
            TITLE,
            load.prize_pool(),
            render_table(&rows(load, tz)),
            TIE_NOTE
        )
    }

    /// Mounts the leaderboard, waits for its single fetch to settle and
    /// renders the page in the viewer's time zone.
    pub async fn run(client: reqwest::Client) -> Result<String> {
        let view = LeaderboardView::new(Arc::new(HttpSource::new(client)));
        if let Some(fetch) = view.activate().await {
            fetch.await.context("Leaderboard fetch task panicked")?;
        }
        let load = view.snapshot().await;
        view.teardown().await;
        if load.is_failed() {
            warn!("Leaderboard unavailable, showing the empty table");
        }
        Ok(render(&load, &chrono::Local))
    }
}

pub mod vote {
    use anyhow::{anyhow, Result};
    use rand::Rng;
    use tracing::info;

    pub const QUESTION: &str = "Who will win the $MVP award for season 2025/26?";

    pub const CANDIDATES: [&str; 5] = ["Jokić", "Embiid", "SGA", "Luka", "Giannis"];

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum VoteOutcome {
        Recorded,
        /// The button moved out from under the cursor.
        Dodged { offset: (i32, i32) },
        AlreadyVoted,
    }

    #[derive(Debug, Default)]
    pub struct Ballot {
        voted: bool,
        offsets: [(i32, i32); 5],
    }

    fn fold(name: &str) -> String {
        name.trim().to_lowercase().replace('ć', "c")
    }

    fn candidate_index(name: &str) -> Result<usize> {
        let wanted = fold(name);
        CANDIDATES
            .iter()
            .position(|c| fold(c) == wanted)
            .ok_or_else(|| anyhow!("'{}' is not on the ballot.", name.trim()))
    }

    impl Ballot {
        pub fn has_voted(&self) -> bool {
            self.voted
        }

        pub fn offset(&self, name: &str) -> Result<(i32, i32)> {
            Ok(self.offsets[candidate_index(name)?])
        }

        pub fn cast<R: Rng>(&mut self, name: &str, rng: &mut R) -> Result<VoteOutcome> {
            let index = candidate_index(name)?;
            if self.voted {
                return Ok(VoteOutcome::AlreadyVoted);
            }
            if index == 0 {
                self.voted = true;
                info!("Vote recorded for {}", CANDIDATES[0]);
                return Ok(VoteOutcome::Recorded);
            }
            let offset = (rng.gen_range(-100..100), rng.gen_range(-100..100));
            self.offsets[index] = offset;
            Ok(VoteOutcome::Dodged { offset })
        }

        /// Percentages per candidate, available once a vote is in.
        pub fn results(&self) -> Option<Vec<(&'static str, u8)>> {
            if !self.has_voted() {
                return None;
            }
            Some(
                CANDIDATES
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (*c, if i == 0 { 100 } else { 0 }))
                    .collect(),
            )
        }
    }

    pub fn render(ballot: &Ballot) -> String {
        let mut lines = vec![
            QUESTION.to_string(),
            "Result of this vote will decide which player's moments the project will collect in the following season.".to_string(),
            String::new(),
        ];
        match ballot.results() {
            Some(results) => {
                lines.push("Voting Results:".to_string());
                for (name, percent) in results {
                    lines.push(format!("  {:<10}{:>4}%", name, percent));
                }
            }
            None => {
                for name in CANDIDATES {
                    let (x, y) = ballot.offset(name).unwrap_or_default();
                    if (x, y) == (0, 0) {
                        lines.push(format!("  [{}]", name));
                    } else {
                        lines.push(format!("  [{}] (moved {:+}, {:+})", name, x, y));
                    }
                }
            }
        }
        lines.join("\n")
    }
}
