use std::cmp::Ordering;

use crate::constants::TREASURE_SCORE_WEIGHT;
use crate::error::{GameError, GameResult};
use crate::roster::{Participant, ParticipantState, Roster};
use crate::types::{GameOverReason, PlayerId, RankingEntry};

/// Running score shown during play.
pub fn live_score(state: &ParticipantState) -> i64 {
    (state.total_steps + state.total_pushes + state.collected) as i64
}

pub fn final_score(state: &ParticipantState) -> i64 {
    state.collected as i64 * TREASURE_SCORE_WEIGHT
}

fn compare(a: &Participant, b: &Participant) -> Ordering {
    b.state
        .collected
        .cmp(&a.state.collected)
        .then(a.state.total_steps.cmp(&b.state.total_steps))
        .then(a.state.total_pushes.cmp(&b.state.total_pushes))
}

/// Final ranking. A victory puts the winner first regardless of stats; the
/// rest are ordered by treasures, then fewer steps, then fewer pushes.
pub fn build_ranking(
    roster: &Roster,
    reason: GameOverReason,
    winner: Option<&PlayerId>,
) -> GameResult<Vec<RankingEntry>> {
    if reason == GameOverReason::Victory {
        let eligible = winner
            .and_then(|id| roster.get(id))
            .map(|p| p.state.remaining_treasures() == 0)
            .unwrap_or(false);
        if !eligible {
            return Err(GameError::NoEligibleWinner);
        }
    }
    if roster.is_empty() {
        return Err(GameError::NoEligibleWinner);
    }

    let mut ordered: Vec<&Participant> = roster.iter().collect();
    ordered.sort_by(|a, b| {
        let a_won = Some(a.id()) == winner;
        let b_won = Some(b.id()) == winner;
        b_won.cmp(&a_won).then_with(|| compare(a, b))
    });

    let mut ranking: Vec<RankingEntry> = Vec::with_capacity(ordered.len());
    for (idx, participant) in ordered.iter().enumerate() {
        let tied_with_previous = idx > 0
            && Some(ordered[idx - 1].id()) != winner
            && compare(ordered[idx - 1], participant) == Ordering::Equal;
        let rank = match ranking.last() {
            Some(previous) if tied_with_previous => previous.rank,
            _ => idx + 1,
        };
        ranking.push(RankingEntry {
            player_id: participant.id().clone(),
            name: participant.identity.name.clone(),
            rank,
            score: final_score(&participant.state),
            treasures: participant.state.collected,
            steps: participant.state.total_steps,
            pushes: participant.state.total_pushes,
        });
    }
    Ok(ranking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;

    fn roster(stats: &[(usize, usize, usize)]) -> Roster {
        let mut roster = Roster::new();
        for (idx, (collected, steps, pushes)) in stats.iter().enumerate() {
            let id = PlayerId::new(format!("p{}", idx + 1));
            roster
                .join(id.clone(), &format!("P{}", idx + 1), SessionId(idx as u64))
                .unwrap();
            let state = &mut roster.get_mut(&id).unwrap().state;
            state.collected = *collected;
            state.total_steps = *steps;
            state.total_pushes = *pushes;
        }
        roster
    }

    #[test]
    fn timeout_ranks_by_treasures_then_fewer_steps() {
        let roster = roster(&[(1, 10, 3), (2, 30, 4), (2, 20, 9)]);
        let ranking = build_ranking(&roster, GameOverReason::Timeout, None).unwrap();
        let order: Vec<&str> = ranking.iter().map(|e| e.player_id.as_str()).collect();
        assert_eq!(order, vec!["p3", "p2", "p1"]);
        assert_eq!(ranking[0].score, 2 * TREASURE_SCORE_WEIGHT);
        assert_eq!(
            ranking.iter().map(|e| e.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn identical_stats_share_a_rank() {
        let roster = roster(&[(1, 5, 5), (1, 5, 5), (0, 0, 0)]);
        let ranking = build_ranking(&roster, GameOverReason::Timeout, None).unwrap();
        assert_eq!(
            ranking.iter().map(|e| e.rank).collect::<Vec<_>>(),
            vec![1, 1, 3]
        );
    }

    #[test]
    fn victory_requires_a_finished_winner() {
        let mut roster = roster(&[(3, 40, 5), (1, 2, 2)]);
        let winner = PlayerId::new("p2");
        let ranking = build_ranking(&roster, GameOverReason::Victory, Some(&winner)).unwrap();
        assert_eq!(ranking[0].player_id, winner);
        assert_eq!(ranking[0].rank, 1);

        roster
            .get_mut(&winner)
            .unwrap()
            .state
            .treasures
            .push_back(crate::types::TreasureId(1));
        assert_eq!(
            build_ranking(&roster, GameOverReason::Victory, Some(&winner)).unwrap_err(),
            GameError::NoEligibleWinner
        );
        assert_eq!(
            build_ranking(&roster, GameOverReason::Victory, None).unwrap_err(),
            GameError::NoEligibleWinner
        );
    }

    #[test]
    fn empty_table_has_no_winner() {
        assert_eq!(
            build_ranking(&Roster::new(), GameOverReason::Timeout, None).unwrap_err(),
            GameError::NoEligibleWinner
        );
    }
}
