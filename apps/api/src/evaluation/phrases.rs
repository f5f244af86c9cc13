//! Rotating headings for the most-impactful-statement card.
//!
//! The heading is cosmetic: the stream event's `category` field stays the
//! stable key, so clients can rely on the orchestration shape while the
//! displayed title varies per submission.

use rand::seq::SliceRandom;

pub(crate) const IMPACTFUL_HEADINGS: [&str; 16] = [
    "We Both Stopped and Said \"That Was Incredible\"",
    "The Moment We Looked at Each Other Like \"Did You Hear That?\"",
    "When We Were Both Blown Away by What You Said",
    "The Moment We Both Knew You Absolutely Crushed It",
    "That Exchange That Made Us So Proud of You",
    "When We Both Agreed This Was Pure Gold",
    "That Time We Both Said \"Now THAT'S How It's Done\"",
    "When We Couldn't Stop Talking About How Good This Was",
    "That Beautiful Moment When We Were Just So Impressed",
    "The Exchange That Had Us Taking Notes for Others",
    "When We Both Felt That Electric Moment of Connection",
    "The Exchange Where We Saw Your Natural Talent Shine Through",
    "When We Both Recognized This as a Masterclass Moment",
    "That Moment We Knew the Student's Life Just Changed",
    "The Part Where We Were Genuinely Moved by Your Approach",
    "That Exchange That Reminded Us Why This Work Matters",
];

pub(crate) fn random_impactful_heading() -> &'static str {
    IMPACTFUL_HEADINGS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(IMPACTFUL_HEADINGS[0])
}
