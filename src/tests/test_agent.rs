use crate::agent::{dqn, her, q, Agent, DqnAgent, HerAgent, QAgent, Transition};
use crate::algorithms::{ppo, reinforce, NesAgent, PpoAgent, ReinforceAgent};
use crate::env::{Outcome, Space};
use crate::error::GymkitError;
use crate::schedule::ConstantSchedule;
use crate::tensor::{vector, Tensor};

fn outcome(observation: Tensor, action: usize, reward: f32, done: bool) -> Outcome {
    Outcome { observation, action, reward, done }
}

/// Drive an agent through one short episode the way the harness does.
fn run_episode(agent: &mut dyn Agent, goal: Option<&Tensor>, steps: usize) {
    let mut state = vector(&[0.1, -0.2]);
    for t in 0..steps {
        agent.adapt(0, t);
        let action = agent.act(&state, goal).unwrap();
        assert!(action < 2);
        let next = vector(&[0.1 * t as f32, 0.2]);
        let result = outcome(next.clone(), action, 1.0, t + 1 == steps);
        agent
            .learn(&Transition { episode: 0, timestep: t, state: &state, goal, action, outcome: &result })
            .unwrap();
        state = next;
    }
    agent.end_episode(0).unwrap();
}

#[test]
fn test_all_agents_run_through_trait() {
    let space = Space::discrete(2).unwrap();
    let mut agents: Vec<Box<dyn Agent>> = vec![
        Box::new(QAgent::new(space.clone(), q::default_config().seed(1)).unwrap()),
        Box::new(DqnAgent::new(2, space.clone(), dqn::default_config().replay_batch_size(2).seed(2)).unwrap()),
        Box::new(ReinforceAgent::new(2, space.clone(), reinforce::default_config().seed(3)).unwrap()),
        Box::new(PpoAgent::new(2, space.clone(), ppo::default_config().batch_size(3).seed(4)).unwrap()),
        Box::new(NesAgent::new(2, 2).unwrap()),
    ];
    for agent in agents.iter_mut() {
        run_episode(agent.as_mut(), None, 5);
    }
}

#[test]
fn test_her_runs_with_goal() {
    let config = her::default_config().dqn(dqn::default_config().replay_batch_size(2).seed(5));
    let mut agent = HerAgent::new(2, 2, Space::discrete(2).unwrap(), config).unwrap();
    let goal = vector(&[1.0, 1.0]);
    run_episode(&mut agent, Some(&goal), 4);
    // a failed episode is remembered once as played and once relabeled
    assert_eq!(agent.memory().len(), 8);
}

#[test]
fn test_exploration_rate_reporting() {
    let space = Space::discrete(2).unwrap();
    let mut q_agent = QAgent::new(space.clone(), q::default_config().epsilon(ConstantSchedule::new(0.3))).unwrap();
    q_agent.act(&vector(&[0.0]), None).unwrap();
    assert_eq!(q_agent.exploration_rate(), Some(0.3));

    let reinforce = ReinforceAgent::new(1, space, reinforce::default_config()).unwrap();
    assert_eq!(reinforce.exploration_rate(), None);
}

#[test]
fn test_q_agent_learns_terminal_reward() {
    let mut agent = QAgent::new(
        Space::discrete(2).unwrap(),
        q::default_config().epsilon(ConstantSchedule::new(0.0)).alpha(1.0).seed(0),
    )
    .unwrap();
    let state = vector(&[0.0, 1.0]);
    let result = outcome(vector(&[1.0, 1.0]), 1, 5.0, true);
    agent
        .learn(&Transition { episode: 0, timestep: 0, state: &state, goal: None, action: 1, outcome: &result })
        .unwrap();
    assert_eq!(agent.table().get(&state, 1).unwrap(), 5.0);
    assert_eq!(agent.act(&state, None).unwrap(), 1);
}

#[test]
fn test_dqn_rejects_out_of_range_transition() {
    let mut agent = DqnAgent::new(2, Space::discrete(2).unwrap(), dqn::default_config()).unwrap();
    let state = vector(&[0.0, 0.0]);
    let result = outcome(state.clone(), 7, 0.0, false);
    let err = Agent::learn(&mut agent, &Transition { episode: 0, timestep: 0, state: &state, goal: None, action: 7, outcome: &result })
        .unwrap_err();
    assert_eq!(err, GymkitError::ActionOutOfRange { action: 7, n_actions: 2 });
}

#[test]
fn test_dqn_target_sync_through_end_episode() {
    let config = dqn::default_config().replay_batch_size(1).update_target_episodes(2).seed(9);
    let mut agent = DqnAgent::new(2, Space::discrete(2).unwrap(), config).unwrap();
    run_episode(&mut agent, None, 3);
    assert_ne!(agent.policy().learnables(), agent.target().learnables());
    run_episode(&mut agent, None, 3);
    assert_eq!(agent.policy().learnables(), agent.target().learnables());
    assert_eq!(agent.episodes(), 2);
}
