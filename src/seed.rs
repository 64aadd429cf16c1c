//! Starter catalog loaded into an empty store.

use crate::{
    error::StorageError,
    models::{Category, Difficulty, NewChapter, NewCourse},
    store::Store,
};

struct SeedCourse {
    title: &'static str,
    description: &'static str,
    category: Category,
    difficulty: Difficulty,
    hours: i32,
    chapters: &'static [(&'static str, &'static str)],
}

const CATALOG: &[SeedCourse] = &[
    SeedCourse {
        title: "Linear Regression",
        description: "Least squares, gradient descent and how to judge a fitted line.",
        category: Category::MlBasics,
        difficulty: Difficulty::Beginner,
        hours: 3,
        chapters: &[
            (
                "What is linear regression",
                "# What is linear regression\n\nLinear regression predicts a continuous value by fitting a line\n(or hyperplane) through the data.\n\n```python\ny = w * x + b\n```\n\n- `w` is the weight (slope)\n- `b` is the bias (intercept)\n",
            ),
            (
                "Least squares",
                "# Least squares\n\nChoose `w` and `b` to minimise the squared error:\n\n```python\nloss = sum((y_i - (w * x_i + b)) ** 2)\n```\n\nFor many features the closed form is `theta = (X^T X)^-1 X^T y`.\n",
            ),
            (
                "Gradient descent",
                "# Gradient descent\n\n1. Initialise the parameters\n2. Compute the gradient of the loss\n3. Step against it: `theta = theta - lr * grad`\n4. Repeat until the loss stops improving\n",
            ),
        ],
    },
    SeedCourse {
        title: "Decision Trees and Ensembles",
        description: "Splitting criteria, pruning, random forests and boosting.",
        category: Category::MlBasics,
        difficulty: Difficulty::Intermediate,
        hours: 4,
        chapters: &[
            (
                "Growing a tree",
                "# Growing a tree\n\nEach split picks the feature and threshold that most reduce impurity\n(Gini or entropy).\n",
            ),
            (
                "Forests and boosting",
                "# Forests and boosting\n\n- **Random forests** average many decorrelated trees.\n- **Boosting** fits each new tree to the residuals of the last.\n",
            ),
        ],
    },
    SeedCourse {
        title: "Neural Network Fundamentals",
        description: "Perceptrons, activations and backpropagation from scratch.",
        category: Category::DeepLearning,
        difficulty: Difficulty::Beginner,
        hours: 5,
        chapters: &[
            (
                "The perceptron",
                "# The perceptron\n\nA weighted sum followed by a non-linearity:\n\n```python\nout = activation(w @ x + b)\n```\n",
            ),
            (
                "Backpropagation",
                "# Backpropagation\n\nThe chain rule, applied layer by layer from the loss back to the inputs.\n",
            ),
        ],
    },
    SeedCourse {
        title: "Convolutional Networks",
        description: "Convolutions, pooling and modern CNN architectures.",
        category: Category::DeepLearning,
        difficulty: Difficulty::Advanced,
        hours: 6,
        chapters: &[
            (
                "Convolution layers",
                "# Convolution layers\n\nA small kernel slides over the input and shares its weights across positions.\n",
            ),
            (
                "Residual connections",
                "# Residual connections\n\n`out = f(x) + x` lets gradients flow through very deep stacks.\n",
            ),
        ],
    },
    SeedCourse {
        title: "Text Preprocessing",
        description: "Tokenization, normalisation and bag-of-words features.",
        category: Category::Nlp,
        difficulty: Difficulty::Beginner,
        hours: 2,
        chapters: &[(
            "Tokenization",
            "# Tokenization\n\nSplit text into units: words, subwords or characters.\n",
        )],
    },
    SeedCourse {
        title: "Attention and Transformers",
        description: "Self-attention, positional encodings and the encoder-decoder stack.",
        category: Category::Nlp,
        difficulty: Difficulty::Intermediate,
        hours: 6,
        chapters: &[
            (
                "Self-attention",
                "# Self-attention\n\n```python\nattn = softmax(Q @ K.T / sqrt(d)) @ V\n```\n",
            ),
            (
                "The transformer block",
                "# The transformer block\n\nAttention, a feed-forward layer, residuals and layer norm.\n",
            ),
        ],
    },
    SeedCourse {
        title: "Prompt Engineering",
        description: "Writing instructions, few-shot examples and structured output.",
        category: Category::Llm,
        difficulty: Difficulty::Beginner,
        hours: 2,
        chapters: &[
            (
                "Clear instructions",
                "# Clear instructions\n\nState the task, the audience and the expected format up front.\n",
            ),
            (
                "Few-shot prompting",
                "# Few-shot prompting\n\nShow a handful of worked examples before the real input.\n",
            ),
        ],
    },
    SeedCourse {
        title: "Fine-tuning Language Models",
        description: "Supervised fine-tuning, LoRA adapters and evaluation.",
        category: Category::Llm,
        difficulty: Difficulty::Advanced,
        hours: 8,
        chapters: &[
            (
                "When to fine-tune",
                "# When to fine-tune\n\nPrefer prompting and retrieval first; fine-tune for style or narrow tasks.\n",
            ),
            (
                "Low-rank adapters",
                "# Low-rank adapters\n\nTrain `A` and `B` with `W' = W + B @ A` while `W` stays frozen.\n",
            ),
        ],
    },
    SeedCourse {
        title: "Notebooks and Python Tooling",
        description: "Jupyter, NumPy and pandas for day-to-day experiments.",
        category: Category::AiTools,
        difficulty: Difficulty::Beginner,
        hours: 3,
        chapters: &[(
            "Working in notebooks",
            "# Working in notebooks\n\nKeep cells small and restart the kernel before sharing results.\n",
        )],
    },
    SeedCourse {
        title: "Serving Models in Production",
        description: "Packaging, batching and monitoring inference services.",
        category: Category::AiTools,
        difficulty: Difficulty::Intermediate,
        hours: 4,
        chapters: &[
            (
                "Packaging",
                "# Packaging\n\nPin dependencies and ship the model weights with a version tag.\n",
            ),
            (
                "Batching",
                "# Batching\n\nGroup requests to keep the accelerator busy without blowing latency.\n",
            ),
        ],
    },
];

/// Inserts the starter catalog if the store has no courses yet.
/// Returns the number of courses inserted.
pub async fn seed_if_empty(store: &dyn Store) -> Result<usize, StorageError> {
    if store.count_courses().await? > 0 {
        tracing::debug!("catalog already populated, skipping seed");
        return Ok(0);
    }

    for c in CATALOG {
        let chapters = c
            .chapters
            .iter()
            .zip(1..)
            .map(|(&(title, content), order)| NewChapter {
                title: title.into(),
                order,
                content: content.into(),
            })
            .collect();
        store
            .insert_course(
                NewCourse {
                    title: c.title.into(),
                    description: c.description.into(),
                    category: c.category,
                    difficulty: c.difficulty,
                    estimated_hours: c.hours,
                },
                chapters,
            )
            .await?;
    }
    tracing::info!(courses = CATALOG.len(), "seeded starter catalog");
    Ok(CATALOG.len())
}
